// External crates
use std::collections::HashSet;
use std::net::IpAddr;

/// Distinct client addresses, split by family.
#[derive(Debug, Clone, Default)]
struct AddressSet {
    v4: HashSet<IpAddr>,
    v6: HashSet<IpAddr>,
}

impl AddressSet {
    fn insert(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(_) => self.v4.insert(addr),
            IpAddr::V6(_) => self.v6.insert(addr),
        };
    }

    fn clear(&mut self) {
        self.v4.clear();
        self.v6.clear();
    }
}

/// Unique visitor tracking. The current set is cleared every interval; the
/// lifetime set exists only when all-time accumulation is enabled.
#[derive(Debug, Clone, Default)]
pub struct UniqueIps {
    current: AddressSet,
    all_time: Option<AddressSet>,
}

impl UniqueIps {
    pub fn new(all_time: bool) -> Self {
        Self {
            current: AddressSet::default(),
            all_time: all_time.then(AddressSet::default),
        }
    }

    pub fn insert(&mut self, addr: IpAddr) {
        self.current.insert(addr);
        if let Some(all_time) = self.all_time.as_mut() {
            all_time.insert(addr);
        }
    }

    pub fn current(&self) -> (usize, usize) {
        (self.current.v4.len(), self.current.v6.len())
    }

    pub fn all_time(&self) -> Option<(usize, usize)> {
        self.all_time.as_ref().map(|s| (s.v4.len(), s.v6.len()))
    }

    pub fn reset_interval(&mut self) {
        self.current.clear();
    }
}
