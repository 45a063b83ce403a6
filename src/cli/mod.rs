pub mod check;
pub mod project;
pub mod run;
