pub mod frame;
pub mod pairing;
pub mod playout;
pub mod protocol;
