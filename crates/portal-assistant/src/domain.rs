//! Plain data types shared by the app and infra layers.

pub mod connection;
pub mod item;
pub mod node;
/// Portal search filter expressions.
pub mod query;
