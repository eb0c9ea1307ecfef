use super::*;

/// In-memory files for config and TLS loading tests. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem(Arc<Mutex<HashMap<String, String>>>);

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(self, path: &str, contents: &str) -> Self {
        self.0
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_string());
        self
    }

    pub fn boxed(&self) -> Filesystem {
        Box::new(self.clone())
    }
}

impl FilesystemTrait for MockFilesystem {
    fn is_file(&self, path: &str) -> bool {
        self.0.lock().unwrap().contains_key(path)
    }

    fn read_to_string(&self, path: &str) -> std::io::Result<String> {
        match self.0.lock().unwrap().get(path) {
            Some(contents) => Ok(contents.clone()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not in mock filesystem", path),
            )),
        }
    }
}
