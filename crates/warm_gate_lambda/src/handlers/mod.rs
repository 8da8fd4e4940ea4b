pub mod dispatcher;
pub mod gate;
pub mod prewarm;
pub mod smoke_runner;
