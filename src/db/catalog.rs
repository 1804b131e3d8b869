//! Standard kinds and relations of the package database

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::relation::{Kind, Relation};
use crate::store::StoreConfig;

pub const NAME_WIDTH: usize = 64;
pub const ID_WIDTH: usize = 4;
pub const FILE_WIDTH: usize = 256;
pub const DEP_WIDTH: usize = 4;

/// Package name
pub fn name_kind() -> Kind {
    Kind::text("name", NAME_WIDTH)
}

/// Package id
pub fn id_kind() -> Kind {
    Kind::integer("id", ID_WIDTH)
}

/// Installed file path, relative to the install root
pub fn file_kind() -> Kind {
    Kind::text("file", FILE_WIDTH)
}

/// Id of a dependency
pub fn dep_kind() -> Kind {
    Kind::integer("dep", DEP_WIDTH)
}

/// Marks a file as claimed by the user
pub fn claim_kind() -> Kind {
    Kind::marker("claim")
}

/// A relation of the standard catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationId {
    NameId,
    IdName,
    IdFile,
    FileId,
    IdDep,
    DepId,
    FileClaim,
}

impl RelationId {
    pub const ALL: [RelationId; 7] = [
        RelationId::NameId,
        RelationId::IdName,
        RelationId::IdFile,
        RelationId::FileId,
        RelationId::IdDep,
        RelationId::DepId,
        RelationId::FileClaim,
    ];

    pub fn kinds(self) -> (Kind, Kind) {
        match self {
            RelationId::NameId => (name_kind(), id_kind()),
            RelationId::IdName => (id_kind(), name_kind()),
            RelationId::IdFile => (id_kind(), file_kind()),
            RelationId::FileId => (file_kind(), id_kind()),
            RelationId::IdDep => (id_kind(), dep_kind()),
            RelationId::DepId => (dep_kind(), id_kind()),
            RelationId::FileClaim => (file_kind(), claim_kind()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RelationId::NameId => "name_id",
            RelationId::IdName => "id_name",
            RelationId::IdFile => "id_file",
            RelationId::FileId => "file_id",
            RelationId::IdDep => "id_dep",
            RelationId::DepId => "dep_id",
            RelationId::FileClaim => "file_claim",
        }
    }

    /// The relation under `dir`
    pub fn relation(self, dir: &Path, config: &StoreConfig) -> Relation {
        let (key, value) = self.kinds();
        Relation::new(dir, key, value).with_config(config.clone())
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RelationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = RelationId::ALL.iter().map(|id| id.name()).collect();
                format!("unknown relation {:?}, expected one of {}", s, names.join(", "))
            })
    }
}
