use clap::ValueEnum;

/// Deployment sizes the store is shipped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeploymentProfile {
    /// Small clinic: 50 patients
    #[default]
    Compact,
    /// Ward: 100 patients
    Standard,
}

impl DeploymentProfile {
    pub fn max_capacity(self) -> usize {
        match self {
            DeploymentProfile::Compact => 50,
            DeploymentProfile::Standard => 100,
        }
    }
}

impl std::fmt::Display for DeploymentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub max_capacity: usize,
    pub initial_capacity: usize,
}

impl StoreConfig {
    pub const DEFAULT_INITIAL_CAPACITY: usize = 2;

    pub fn new(profile: DeploymentProfile, initial_capacity: usize) -> Self {
        Self { max_capacity: profile.max_capacity(), initial_capacity }.normalized()
    }

    /// Explicit cap, mostly for tests that want a tiny store.
    pub fn with_max(max_capacity: usize, initial_capacity: usize) -> Self {
        Self { max_capacity, initial_capacity }.normalized()
    }

    // Initial reservation lives in 1..=max so doubling always makes progress.
    fn normalized(mut self) -> Self {
        self.max_capacity = self.max_capacity.max(1);
        self.initial_capacity = self.initial_capacity.clamp(1, self.max_capacity);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DeploymentProfile::default(), Self::DEFAULT_INITIAL_CAPACITY)
    }
}
