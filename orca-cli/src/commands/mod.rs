pub mod check;
pub mod control;
pub mod health;
pub mod id;
pub mod run;
pub mod sync;
pub mod validate;
