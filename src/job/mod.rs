mod completer;
mod record;

pub use completer::{CompletionLog, JobCompleter, RESULT_CODE_NONE};
pub use record::{JobCompletion, JobId, JobOutcome, JobRecord, JobStatus};
