/// Default number of records allowed mid-pipeline at once
pub const DEFAULT_CONCURRENCY: usize = 1;
/// Default number of undispatched entries the queue holds before writes suspend
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;
