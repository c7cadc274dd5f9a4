//! Google Drive integration: REST client, OAuth grants, stored tokens, and
//! the folder layout uploads land in.

pub mod api;
pub mod folders;
pub mod oauth;
pub mod session;
pub mod tokens;

pub use api::{DriveApi, DriveError, DriveFile, FileUpload, GoogleDrive};
pub use oauth::{DriveAuthorizer, GoogleOAuth, OAuthError, TokenGrant};
pub use session::DriveSession;
