pub mod events;
pub mod ids;
pub mod record;

pub use events::{JobEvent, ProgressEvent};
pub use ids::{JobId, WorkerId};
pub use record::{ClaimedJob, JobRecord, JobStatus};
