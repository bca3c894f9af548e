pub mod normalize;
pub mod worker;

pub use normalize::{normalize_record, RawBusRecord};
pub use worker::{ConsumerSettings, TxConsumer, CONSUMER_NAME};
