pub mod compare;
pub mod describe;
pub mod fetch;
pub mod fit;
pub mod harmonize;
pub mod pack_grm;
pub mod run;
