pub mod enumerator;
pub mod progress;
pub mod temp;
