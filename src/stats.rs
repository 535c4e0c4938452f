/// Counters for one mirror walk
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorStats {
    pub files: u64,
    pub bytes: u64,
    pub dirs_created: u64,
    pub dirs_existing: u64,
    pub errors: Vec<String>,
}

impl MirrorStats {
    pub fn add_file(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
