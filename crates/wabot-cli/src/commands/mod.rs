pub mod check;
pub mod init;
pub mod normalize;
pub mod serve;
