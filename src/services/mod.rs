pub mod account_store;
pub mod auth;
pub mod pagination;
pub mod provider;
pub mod spotify;
pub mod title_matcher;
pub mod token_manager;
pub mod transfer;
pub mod youtube;

pub use account_store::{AccountStore, PgAccountStore};
pub use auth::AuthService;
pub use spotify::SpotifyClient;
pub use token_manager::TokenManager;
pub use transfer::TransferService;
pub use youtube::YouTubeClient;
