#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Tgz,
    Tar,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tgz => "tgz",
            Self::Tar => "tar",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Tgz => ".tgz",
            Self::Tar => ".tar",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tgz" => Some(Self::Tgz),
            "tar" => Some(Self::Tar),
            _ => None,
        }
    }

    /// Only the final path segment is considered; query and fragment are ignored.
    pub fn infer_from_url(url: &str) -> Option<Self> {
        let file_name = archive_file_name(url)?.to_ascii_lowercase();
        if file_name.ends_with(".tgz") {
            return Some(Self::Tgz);
        }
        if file_name.ends_with(".tar") {
            return Some(Self::Tar);
        }
        None
    }
}

pub fn archive_file_name(url: &str) -> Option<&str> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

pub fn extracted_dir_name(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for archive_type in [ArchiveType::Tgz, ArchiveType::Tar] {
        if lower.ends_with(archive_type.extension()) {
            return &file_name[..file_name.len() - archive_type.extension().len()];
        }
    }
    file_name
}
