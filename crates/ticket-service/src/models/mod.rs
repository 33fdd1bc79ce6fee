//! 工单服务领域模型

pub mod actor;
pub mod comment;
pub mod directory;
pub mod enums;
pub mod notification;
pub mod ticket;

pub use actor::Actor;
pub use comment::Comment;
pub use directory::{Connection, Customer, StaffMember, UserProfile};
pub use enums::{CommentVisibility, Role, TicketPriority, TicketStatus};
pub use notification::{Notification, Recipient};
pub use ticket::{
    AssignmentEntry, Attachment, Page, Pagination, StoredBlob, Ticket, TicketDetail, TicketFilter,
};
