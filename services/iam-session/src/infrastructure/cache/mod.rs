//! 缓存实现

mod redis_attempt_counter;

pub use redis_attempt_counter::RedisAttemptCounterRepository;
