pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod http;
pub mod input;
pub mod lookup;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod search;
pub mod select;
pub mod table;
