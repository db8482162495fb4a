pub mod domain;
pub mod error;
pub mod protocol;
pub mod validation;

pub use domain::{AttemptId, IdentityToken, Notice, NoticeLevel, ViewState};
pub use error::{ErrorCode, ErrorReport, FetchFailure, ValidationError};
pub use validation::validate;
