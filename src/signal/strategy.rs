use crate::error::MessagingError;

/// What a sequential broadcast does when a handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequentialErrorHandling {
    /// Stop at the first failing handler.
    #[default]
    ThrowOnFirstError,
    /// Run every handler, then report all failures.
    ThrowAfterAll,
}

/// How a published signal is delivered to its handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastingStrategy {
    /// One handler at a time, in registration order.
    Sequential(SequentialErrorHandling),
    /// Handlers run concurrently; failures are reported after all have finished.
    Parallel {
        /// Upper bound on concurrently running handlers. `None` means unbounded.
        max_degree_of_parallelism: Option<usize>,
    },
}

impl Default for BroadcastingStrategy {
    fn default() -> Self {
        BroadcastingStrategy::Sequential(SequentialErrorHandling::default())
    }
}

impl BroadcastingStrategy {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn sequential_throw_after_all() -> Self {
        BroadcastingStrategy::Sequential(SequentialErrorHandling::ThrowAfterAll)
    }

    pub fn parallel() -> Self {
        BroadcastingStrategy::Parallel {
            max_degree_of_parallelism: None,
        }
    }

    pub fn parallel_with_max_degree(max_degree_of_parallelism: usize) -> Self {
        BroadcastingStrategy::Parallel {
            max_degree_of_parallelism: Some(max_degree_of_parallelism),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), MessagingError> {
        match self {
            BroadcastingStrategy::Parallel {
                max_degree_of_parallelism: Some(0),
            } => Err(MessagingError::InvalidConfiguration(
                "max degree of parallelism must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Reduce handler failures to a single result.
///
/// Cancellations collapse into one [`MessagingError::Cancelled`]; a single
/// failure is returned as is; anything else becomes an aggregate.
pub(crate) fn collate(mut errors: Vec<MessagingError>) -> Result<(), MessagingError> {
    if errors.is_empty() {
        return Ok(());
    }
    if errors.iter().all(MessagingError::is_cancelled) {
        return Err(MessagingError::Cancelled);
    }
    if errors.len() == 1 {
        return Err(errors.remove(0));
    }
    Err(MessagingError::Aggregate(errors))
}
