pub mod fanout;

pub use fanout::AlertFanout;
