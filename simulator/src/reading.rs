use rand::Rng;
use serde::Serialize;

const GIB: i64 = 1024 * 1024 * 1024;

/// Body of one `POST /receive_data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageReading {
    pub device_number: i64,
    pub free_space: i64,
}

/// Free space of one simulated device, drifting between reports.
#[derive(Debug, Clone)]
pub struct SimulatedDisk {
    pub device_number: i64,
    capacity: i64,
    free: i64,
}

impl SimulatedDisk {
    pub fn new(rng: &mut impl Rng, device_number: i64) -> Self {
        let capacity = rng.gen_range(64..=512) * GIB;
        let free = rng.gen_range(capacity / 10..capacity);
        Self {
            device_number,
            capacity,
            free,
        }
    }

    pub fn next_reading(&mut self, rng: &mut impl Rng) -> StorageReading {
        let free = if rng.gen_bool(0.02) {
            rng.gen_range(GIB / 10..GIB) // 2% nearly-full disks
        } else {
            let drift = rng.gen_range(-GIB / 2..=GIB / 4);
            (self.free + drift).clamp(GIB / 10, self.capacity)
        };
        self.free = free;

        StorageReading {
            device_number: self.device_number,
            free_space: free,
        }
    }
}
