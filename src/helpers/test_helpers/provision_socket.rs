use super::*;
use std::net::{SocketAddr, TcpListener};

struct KnownPort {
    port: u16,
    is_locked: AtomicBool,
}

/// A localhost port nothing else in this process will use until this is dropped
pub struct ReservedPort(Arc<KnownPort>);

impl ReservedPort {
    pub fn port(&self) -> u16 {
        self.0.port
    }
}

impl Drop for ReservedPort {
    fn drop(&mut self) {
        self.0.is_locked.store(false, SeqCst);
    }
}

struct Ports {
    known: Vec<Arc<KnownPort>>,
    next: u16,
}

lazy_static::lazy_static! {
    static ref PORTS: Mutex<Ports> = Mutex::new(Ports {
        known: Vec::new(),
        next: 51111, // Anything over 49152 works
    });
}

/// Returns a port that was free when checked. Keeps a process-wide pool so tests running in
/// parallel never get the same one.
pub fn provision_port() -> ReservedPort {
    let mut ports = PORTS.lock().unwrap();
    for known in &ports.known {
        // is_locked only goes false to true while PORTS is locked
        if !known.is_locked.load(SeqCst) {
            known.is_locked.store(true, SeqCst);
            return ReservedPort(known.clone());
        }
    }
    loop {
        ports.next += 1;
        if ports.next >= 65535 {
            panic!("provision_port() could not find a free port");
        }
        let addr = SocketAddr::from(([0, 0, 0, 0], ports.next));
        if TcpListener::bind(addr).is_ok() {
            let known = Arc::new(KnownPort {
                port: ports.next,
                is_locked: AtomicBool::new(true),
            });
            ports.known.push(known.clone());
            return ReservedPort(known);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ports_differ() {
        let a = provision_port();
        let b = provision_port();
        assert_ne!(a.port(), b.port());
    }

    #[test]
    fn dropped_ports_are_reused() {
        for _ in 0..100 {
            let _ = provision_port();
        }
        assert!(PORTS.lock().unwrap().known.len() < 50);
    }
}
