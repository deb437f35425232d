/// In-band control-flow values raised by the core and caught exclusively
/// by the agent's scoped context. There is no exception-based `goto`
/// here, so these travel as an ordinary enum inside a `Result` rather
/// than unwinding the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Batch strategy: the value is deferred until `executeBatch` /
    /// `tryDownloadAll` resolve it.
    NotAvailable,
    /// `whenCheckpoint`/`whenCheckpointPattern` named a checkpoint other
    /// than the agent's `latest_checkpoint`; the guarded block is
    /// skipped.
    WrongCheckpoint,
    /// `gotoCheckpoint` committed a transition; everything after it in
    /// the current scope is skipped.
    GotoCheckpoint,
}

/// A primitive operation's result: either the value, or a control signal
/// that the caller's scope is expected to catch (not a true error).
pub type Outcome<T> = std::result::Result<T, ControlSignal>;
