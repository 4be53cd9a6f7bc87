pub mod health;
pub mod multisites;
pub mod sites;
