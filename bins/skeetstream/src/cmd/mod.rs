pub mod cat;
pub mod run;
