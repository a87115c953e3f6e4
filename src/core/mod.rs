pub mod aggregator;
pub mod chat_stream;
pub mod config;
pub mod dispatcher;
pub mod message;
pub mod providers;
pub mod sink;
pub mod tool_result;
pub mod turn;
