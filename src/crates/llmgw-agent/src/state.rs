//! Per-agent transient state: the anonymous and
//! checkpoint sequence counters, and which checkpoint (if any) is
//! currently active. None of this is persisted directly — what survives
//! a restart is the `WorkingMetadata` held in `llmgw-files`; this struct
//! only tracks the in-process view derived from it.

/// `anonymous_counter` resets to zero on every [`crate::Agent::enter`];
/// `active_checkpoint`/`checkpoint_counter` are set by
/// `when_checkpoint`/`when_checkpoint_pattern` and cleared unconditionally
/// when the owning scope exits.
#[derive(Debug, Default)]
pub struct TransientState {
    pub anonymous_counter: u64,
    pub active_checkpoint: Option<String>,
    pub checkpoint_counter: Option<u64>,
}

impl TransientState {
    pub fn reset_for_entry(&mut self) {
        self.anonymous_counter = 0;
    }

    pub fn clear_checkpoint(&mut self) {
        self.active_checkpoint = None;
        self.checkpoint_counter = None;
    }

    /// Allocates the next `seq_id`: the checkpoint counter while a
    /// checkpoint is active, otherwise the anonymous counter. Returns
    /// `(seq_id, used_checkpoint)`.
    pub fn next_seq_id(&mut self) -> (u64, bool) {
        if self.active_checkpoint.is_some() {
            let counter = self.checkpoint_counter.get_or_insert(0);
            let seq = *counter;
            *counter += 1;
            (seq, true)
        } else {
            let seq = self.anonymous_counter;
            self.anonymous_counter += 1;
            (seq, false)
        }
    }
}
