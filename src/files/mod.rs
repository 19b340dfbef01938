pub mod entry;
pub mod listing;
pub mod ls_receiver;

pub use entry::{escape, EntryId, FileEntry, FileTree, FileType, ListingRow};
pub use listing::{FileListingService, ListingReceiver};
pub use ls_receiver::{parse_ls_line, LsReceiver};
