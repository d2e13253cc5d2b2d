//! Backend for the team trip vote: destinations curated by admins, one vote
//! per employee, results tallied live. Actors own the domain logic and a
//! Postgres unique constraint arbitrates concurrent votes.

pub mod config;
pub mod db;
pub mod error;
pub mod log;
pub mod routes;
pub mod server;
pub mod services;
pub mod span;
