pub mod code_lists;
pub mod credential;
pub mod ddcc;
pub mod did;
