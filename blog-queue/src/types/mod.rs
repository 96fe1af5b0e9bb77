pub mod ids;
pub mod message;
pub mod record;
pub mod priority;
pub mod events;

pub use ids::{JobId, LeaseToken};
pub use message::JobMessage;
pub use record::{JobRecord, JobState, LeasedJob};
pub use priority::JobPriority;
pub use events::JobEvent;
