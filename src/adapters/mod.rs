// Adapters: concrete implementations for external systems (HTTP clients,
// build-directory storage).

pub mod bugzilla;
pub mod github;
pub mod storage;

pub use bugzilla::BugzillaClient;
pub use github::GithubClient;
pub use storage::LocalStorage;
