mod discrimination_tree;
pub use discrimination_tree::{DiscriminationTree, Fact, NodeId, Sifted};

mod cache_tree;
pub use cache_tree::CacheTree;
