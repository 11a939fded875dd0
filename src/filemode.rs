use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FileMode(pub u32);

impl std::fmt::Octal for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Octal::fmt(&self.0, f)
    }
}

impl FileMode {
    pub const DIRECTORY: FileMode = FileMode(0o040000);
    pub const EXECUTABLE: FileMode = FileMode(0o100755);
    pub const REGULAR: FileMode = FileMode(0o100644);
    pub const SYMLINK: FileMode = FileMode(0o120000);

    /// Normalise the mode of a file on disk to one of the modes that can be stored in a tree.
    ///
    /// `metadata` must come from `symlink_metadata`, otherwise links are followed.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        if metadata.file_type().is_symlink() {
            FileMode::SYMLINK
        } else if metadata.is_dir() {
            FileMode::DIRECTORY
        } else if FileMode(metadata.mode()).is_executable() {
            FileMode::EXECUTABLE
        } else {
            FileMode::REGULAR
        }
    }

    /// Parse the octal mode of a tree entry. Only the modes git writes are accepted; git writes
    /// directories as `40000`, though `040000` is tolerated.
    pub fn parse_tree_mode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"100644" => Some(FileMode::REGULAR),
            b"100755" => Some(FileMode::EXECUTABLE),
            b"120000" => Some(FileMode::SYMLINK),
            b"40000" | b"040000" => Some(FileMode::DIRECTORY),
            _ => None,
        }
    }

    pub fn is_executable(self) -> bool {
        self.0 & libc::S_IXUSR as u32 != 0
    }

    pub fn is_directory(self) -> bool {
        self == FileMode::DIRECTORY
    }

    pub fn is_symlink(self) -> bool {
        self == FileMode::SYMLINK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_matches_git() {
        assert_eq!(format!("{:o}", FileMode::DIRECTORY), "40000");
        assert_eq!(format!("{:o}", FileMode::REGULAR), "100644");
        assert_eq!(format!("{:06o}", FileMode::DIRECTORY), "040000");
    }

    #[test]
    fn parse_tree_mode() {
        assert_eq!(FileMode::parse_tree_mode(b"040000"), Some(FileMode::DIRECTORY));
        assert_eq!(FileMode::parse_tree_mode(b"40000"), Some(FileMode::DIRECTORY));
        assert_eq!(FileMode::parse_tree_mode(b"100755"), Some(FileMode::EXECUTABLE));
        assert_eq!(FileMode::parse_tree_mode(b"100655"), None);
    }
}
