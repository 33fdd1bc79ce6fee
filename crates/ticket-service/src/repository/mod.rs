//! 数据库仓储层
//!
//! 提供所有实体的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 数组类字段（分配历史、评论、附件、设备令牌）只做原子追加或移除
//! - 定义 trait 接口以支持 mock 测试与内存实现

mod comment_repo;
mod device_token_repo;
mod directory_repo;
mod memory;
mod notification_repo;
mod ticket_repo;
mod traits;

pub use comment_repo::CommentRepository;
pub use device_token_repo::DeviceTokenRepository;
pub use directory_repo::DirectoryRepository;
pub use memory::MemoryStore;
pub use notification_repo::NotificationRepository;
pub use ticket_repo::TicketRepository;
pub use traits::*;
