/// Realtime event sequence number.
pub type SequenceNumber = u64;

/// Lifecycle of a collection's request pipeline.
///
/// `Working` means a remote operation is in flight; the queue guarantees at
/// most one per collection. `Error` is sticky until the owner decides how to
/// recover (re-enqueue, clear, or reload).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CollectionStatus {
    #[default]
    Idle,
    Working,
    Done,
    Error,
}

impl CollectionStatus {
    pub fn is_working(self) -> bool {
        self == CollectionStatus::Working
    }
}
