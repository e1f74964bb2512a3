mod pool;

pub use self::pool::{
    EndpointPool, EndpointSnapshot, ErrorKind, PoolError, PoolSnapshot, ProviderKind,
};
