mod bearer;

pub use bearer::{AuthenticatedSubject, BearerAuthFactory, BearerAuthService, UNPROTECTED_PATHS};
