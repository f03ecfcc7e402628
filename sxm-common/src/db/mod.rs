//! Database access: schema initialization and the song repository

pub mod init;
pub mod songs;

pub use init::{init_database, init_schema};
pub use songs::{SongRepository, SqliteSongRepository};
