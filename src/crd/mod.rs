mod tidb_cluster;

pub use tidb_cluster::*;
