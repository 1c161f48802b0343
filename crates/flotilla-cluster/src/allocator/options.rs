use crate::master::MasterOptions;
use crate::resources::{MIN_CPUS, MIN_MEM};

#[derive(Debug, Clone)]
pub struct AllocatorOptions {
    /// Minimum free cpus on a slave before it is considered for offers.
    pub min_cpus: f64,
    /// Minimum free memory (in MB) on a slave before it is considered for
    /// offers.
    pub min_mem: f64,
    /// The refusal filter duration applied when a decline carries no
    /// explicit filter. Zero disables the filter.
    pub default_refuse_seconds: f64,
}

impl AllocatorOptions {
    pub fn new(options: &MasterOptions) -> Self {
        Self {
            min_cpus: options.min_cpus,
            min_mem: options.min_mem,
            default_refuse_seconds: options.default_refuse_seconds,
        }
    }
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            min_cpus: MIN_CPUS,
            min_mem: MIN_MEM,
            default_refuse_seconds: 5.0,
        }
    }
}
