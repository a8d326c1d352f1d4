use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::RequestLog;

/// Append-only request history. Unbounded unless a capacity is given, in
/// which case the oldest entries are dropped first.
#[derive(Debug, Default)]
pub struct RequestLogBook {
    entries: Mutex<VecDeque<RequestLog>>,
    capacity: Option<usize>,
}

impl RequestLogBook {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    pub fn push(&self, entry: RequestLog) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if let Some(capacity) = self.capacity {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
    }

    pub fn list(&self) -> Vec<RequestLog> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
