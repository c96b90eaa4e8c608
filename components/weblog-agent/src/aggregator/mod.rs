pub mod aggregator;
pub mod dimensions;
pub mod histogram;
pub mod response;
pub mod timing;
pub mod unique_ips;
