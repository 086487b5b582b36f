/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// The queue sequencer and the mutating request turn it drives.
	Sequencer,
	/// Non-mutating request work fanned out from the sequencer.
	Read,
	/// Synchronization channel service loops and asset transfers.
	Sync,
	/// Blocking work executed on the blocking pool.
	Blocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Sequencer => "sequencer",
			Self::Read => "read",
			Self::Sync => "sync",
			Self::Blocking => "blocking",
		}
	}
}
