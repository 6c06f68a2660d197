//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod decision;
mod key;
mod policy;
mod sweeper;

pub use backend::CounterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{CounterEntry, CounterStore};
pub use decision::{
    DenialBody, LimitReached, QuotaStatus, RateLimitDecision, RateLimitInfo, HEADER_LIMIT,
    HEADER_REMAINING, HEADER_RESET, HEADER_WINDOW,
};
pub use key::{KeyScope, RateLimitKey};
pub use policy::AdmissionPolicy;
pub use sweeper::CounterSweeper;
