//! Synthetic security events for classroom demos and manual testing.
//!
//! The mix mirrors a noisy small fleet: 60% SSH logins, 25% detected port
//! scans, 15% sensitive file access, drawn from a small pool of suspect
//! addresses and common user names.

use crate::events::{EventKind, NewEvent, Outcome};
use crate::storage::{SqliteStore, StoreError};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

pub const SUSPECT_ADDRS: [&str; 5] = [
    "203.45.12.88",
    "198.23.45.67",
    "176.89.12.34",
    "45.76.123.45",
    "89.234.67.12",
];

const INTERNAL_ADDRS: [&str; 2] = ["192.168.1.100", "10.0.0.50"];

pub const TEST_USERS: [&str; 5] = ["admin", "root", "user", "test", "guest"];

const SENSITIVE_FILES: [&str; 4] = ["/etc/passwd", "/etc/shadow", "/var/log/auth.log", "/root/.ssh/id_rsa"];

/// Address used by the brute-force simulation.
pub const BRUTE_FORCE_ADDR: &str = "203.45.12.88";
/// Address used by the port-scan simulation.
pub const PORT_SCAN_ADDR: &str = "198.23.45.67";

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn random_server<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    rng.gen_range(1..=3)
}

pub fn ssh_event<R: Rng + ?Sized>(rng: &mut R) -> NewEvent {
    let mut sources: Vec<&str> = SUSPECT_ADDRS.to_vec();
    sources.extend_from_slice(&INTERNAL_ADDRS);
    let user = pick(rng, &TEST_USERS);
    let (outcome, description) = if rng.gen_bool(0.5) {
        (Outcome::Failure, format!("Failed SSH login for {}", user))
    } else {
        (Outcome::Success, format!("Successful SSH login for {}", user))
    };

    NewEvent::new(random_server(rng), EventKind::Ssh, pick(rng, &sources), outcome)
        .user(user)
        .description(description)
}

pub fn port_scan_event<R: Rng + ?Sized>(rng: &mut R) -> NewEvent {
    let ports = rng.gen_range(10..=50);
    NewEvent::new(random_server(rng), EventKind::PortScan, pick(rng, &SUSPECT_ADDRS), Outcome::Detected)
        .description(format!("Port scan detected - {} ports probed", ports))
}

pub fn file_access_event<R: Rng + ?Sized>(rng: &mut R) -> NewEvent {
    let mut sources: Vec<&str> = SUSPECT_ADDRS.to_vec();
    sources.push(INTERNAL_ADDRS[0]);
    let outcome = if rng.gen_bool(0.5) { Outcome::Failure } else { Outcome::Success };

    NewEvent::new(random_server(rng), EventKind::FileAccess, pick(rng, &sources), outcome)
        .user(pick(rng, &TEST_USERS))
        .description(format!("File access attempt on {}", pick(rng, &SENSITIVE_FILES)))
}

/// One event drawn from the standard mix.
pub fn random_event<R: Rng + ?Sized>(rng: &mut R) -> NewEvent {
    let roll: f64 = rng.gen();
    if roll < 0.60 {
        ssh_event(rng)
    } else if roll < 0.85 {
        port_scan_event(rng)
    } else {
        file_access_event(rng)
    }
}

/// Write `count` random events. Returns how many were stored.
pub fn generate(store: &SqliteStore, count: usize) -> Result<usize, StoreError> {
    let mut rng = rand::thread_rng();
    for i in 0..count {
        store.insert_event(&random_event(&mut rng))?;
        if (i + 1) % 20 == 0 {
            info!(written = i + 1, total = count, "Generating events");
        }
    }
    info!(count, "Random events generated");
    Ok(count)
}

/// Write `attempts` failed SSH logins from [`BRUTE_FORCE_ADDR`] against server 1.
pub fn simulate_brute_force(store: &SqliteStore, attempts: usize) -> Result<Vec<i64>, StoreError> {
    let mut rng = rand::thread_rng();
    let mut ids = Vec::with_capacity(attempts);
    for i in 0..attempts {
        let event = NewEvent::new(1, EventKind::Ssh, BRUTE_FORCE_ADDR, Outcome::Failure)
            .user(pick(&mut rng, &TEST_USERS))
            .description(format!("Brute force attempt #{} - wrong password", i + 1));
        ids.push(store.insert_event(&event)?);
    }
    info!(attempts, source = BRUTE_FORCE_ADDR, "Brute force simulated");
    Ok(ids)
}

/// Write `scans` detected port scans from [`PORT_SCAN_ADDR`] against server 2.
pub fn simulate_port_scan(store: &SqliteStore, scans: usize) -> Result<Vec<i64>, StoreError> {
    let mut rng = rand::thread_rng();
    let mut ids = Vec::with_capacity(scans);
    for _ in 0..scans {
        let event = NewEvent::new(2, EventKind::PortScan, PORT_SCAN_ADDR, Outcome::Detected)
            .description(format!("Port scan detected - {} ports probed", rng.gen_range(10..=50)));
        ids.push(store.insert_event(&event)?);
    }
    info!(scans, source = PORT_SCAN_ADDR, "Port scan simulated");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_events_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let e = random_event(&mut rng);
            assert!((1..=3).contains(&e.server_id));
            assert!(!e.source_addr.is_empty());
            assert!(e.timestamp.is_none());
            match e.kind {
                EventKind::Ssh => {
                    assert!(matches!(e.outcome, Outcome::Success | Outcome::Failure));
                    assert!(e.user.is_some());
                }
                EventKind::PortScan => {
                    assert_eq!(e.outcome, Outcome::Detected);
                    assert!(e.user.is_none());
                    assert!(SUSPECT_ADDRS.contains(&e.source_addr.as_str()));
                }
                EventKind::FileAccess => assert!(e.description.starts_with("File access attempt on /")),
            }
        }
    }

    #[test]
    fn test_mix_contains_every_kind() {
        let mut rng = StdRng::seed_from_u64(42);
        let kinds: Vec<EventKind> = (0..500).map(|_| random_event(&mut rng).kind).collect();
        for kind in [EventKind::Ssh, EventKind::PortScan, EventKind::FileAccess] {
            assert!(kinds.contains(&kind));
        }
    }
}
