pub(crate) mod oracle;
pub use oracle::*;

mod hypothesis;
pub use hypothesis::*;

mod activity;
pub use activity::{Activity, Bisection};

mod continuous;
pub use continuous::ContinuousLearner;

mod kearns_vazirani;
pub use kearns_vazirani::KearnsVazirani;

mod reviser;
pub use reviser::{Reviser, TestWords};

mod conflict_aware;
pub use conflict_aware::{ConflictAware, Outcome};
