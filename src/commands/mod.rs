pub mod check;
pub mod goals;
pub mod run;
