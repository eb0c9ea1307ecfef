/// A mockable interface to the filesystem. Config files and TLS key material are read through it.
pub trait FilesystemTrait {
    /// Like std::path::Path::is_file()
    fn is_file(&self, path: &str) -> bool;
    /// Like std::fs::read_to_string()
    fn read_to_string(&self, path: &str) -> std::io::Result<String>;

    /// Reads a file, naming the path and its purpose in the error
    fn read_named(&self, what: &str, path: &str) -> Result<String, Box<dyn std::error::Error>> {
        self.read_to_string(path)
            .map_err(|e| format!("failed to read {} from {}: {}", what, path, e).into())
    }
}

pub type Filesystem = Box<dyn FilesystemTrait>;

pub fn real_filesystem() -> Filesystem {
    Box::new(FilesystemImpl)
}

struct FilesystemImpl;

impl FilesystemTrait for FilesystemImpl {
    fn is_file(&self, path: &str) -> bool {
        std::path::Path::new(path).is_file()
    }

    fn read_to_string(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}
