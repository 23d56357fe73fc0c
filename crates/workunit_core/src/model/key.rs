use super::Entity;
use std::any::{type_name, TypeId};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Stable identity of an entity type within one process.
#[derive(Debug, Clone, Copy)]
pub struct EntityTypeKey {
    type_id: TypeId,
    type_name: &'static str,
    table: &'static str,
}

impl EntityTypeKey {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            table: T::TABLE,
        }
    }

    /// Fully qualified Rust type name, for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }
}

impl PartialEq for EntityTypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EntityTypeKey {}

impl Hash for EntityTypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl Display for EntityTypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
