//! Compile and link option sets resolved per target

use std::fmt;
use std::path::Path;

/// Source language of a target or file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    CPlusPlus,
}

impl Language {
    /// Identify the language of a source file by extension.
    pub fn from_source_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        match ext {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "c++" => Some(Language::CPlusPlus),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::CPlusPlus => "c++",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a target links into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Executable,
    StaticLibrary,
    SharedLibrary,
}

/// Options fed to every compile job of a target
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub include_paths: Vec<String>,
    pub custom_flags: Vec<String>,
    pub defines: Vec<String>,
    pub debug_info: bool,
    pub compile_for_library: bool,
}

impl CompilerOptions {
    /// Fold a whitespace-joined package attribute into the include paths.
    pub fn add_include_paths(&mut self, joined: &str) {
        push_split(&mut self.include_paths, joined);
    }

    pub fn add_custom_flags(&mut self, joined: &str) {
        push_split(&mut self.custom_flags, joined);
    }

    pub fn add_define(&mut self, define: &str) {
        if !define.is_empty() {
            self.defines.push(define.to_string());
        }
    }
}

/// Options fed to the link job of a target
#[derive(Debug, Clone)]
pub struct LinkerOptions {
    pub link_type: LinkType,
    pub language: Language,
    pub custom_flags: Vec<String>,
    pub library_paths: Vec<String>,
    pub libraries: Vec<String>,
    pub static_libraries: Vec<String>,
}

impl LinkerOptions {
    pub fn new(link_type: LinkType, language: Language) -> Self {
        Self {
            link_type,
            language,
            custom_flags: Vec::new(),
            library_paths: Vec::new(),
            libraries: Vec::new(),
            static_libraries: Vec::new(),
        }
    }

    pub fn add_custom_flags(&mut self, joined: &str) {
        push_split(&mut self.custom_flags, joined);
    }

    pub fn add_library_paths(&mut self, joined: &str) {
        push_split(&mut self.library_paths, joined);
    }

    pub fn add_libraries(&mut self, joined: &str) {
        push_split(&mut self.libraries, joined);
    }

    pub fn add_static_library(&mut self, path: &str) {
        if !path.is_empty() {
            self.static_libraries.push(path.to_string());
        }
    }
}

fn push_split(list: &mut Vec<String>, joined: &str) {
    list.extend(joined.split_whitespace().map(str::to_string));
}
