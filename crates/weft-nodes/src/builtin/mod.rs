pub mod conditional;
pub mod if_else;
pub mod io;
pub mod subworkflow;
