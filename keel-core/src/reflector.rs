use crate::{
    Association, ColumnDescriptor, Declaration, Entity, FieldKind, FieldTag, IndexDescriptor,
    MappingError, NameMapper, Result, TableDescriptor,
};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Turns entity declarations into table descriptors, once per type.
///
/// Descriptors are memoized by declaration identity. The first call for a type parses the
/// field annotations and validates them, every later call is a read lock and a clone of the
/// `Arc`.
pub struct Reflector {
    mapper: Arc<dyn NameMapper>,
    cache: RwLock<HashMap<usize, Arc<TableDescriptor>>>,
}

impl Reflector {
    pub fn new(mapper: Arc<dyn NameMapper>) -> Self {
        Self {
            mapper,
            cache: Default::default(),
        }
    }

    pub fn mapper(&self) -> &dyn NameMapper {
        self.mapper.as_ref()
    }

    pub fn describe<E: Entity>(&self) -> Result<Arc<TableDescriptor>> {
        self.describe_declaration(E::declaration())
    }

    pub fn describe_declaration(
        &self,
        declaration: &'static Declaration,
    ) -> Result<Arc<TableDescriptor>> {
        self.describe_nested(declaration, &mut Vec::new())
    }

    fn describe_nested(
        &self,
        declaration: &'static Declaration,
        stack: &mut Vec<usize>,
    ) -> Result<Arc<TableDescriptor>> {
        let key = declaration as *const Declaration as usize;
        if let Some(descriptor) = self
            .cache
            .read()
            .map_err(|_| MappingError::session("The reflector cache is poisoned"))?
            .get(&key)
        {
            return Ok(descriptor.clone());
        }
        if stack.contains(&key) {
            return Err(MappingError::configuration(
                declaration.name,
                "cyclic cascade between entities",
            ));
        }
        stack.push(key);
        let built = self.build(declaration, stack);
        stack.pop();
        let descriptor = Arc::new(built?);
        log::debug!(
            "Described `{}` as table `{}` with {} columns",
            declaration.name,
            descriptor.name,
            descriptor.columns.len()
        );
        let mut cache = self
            .cache
            .write()
            .map_err(|_| MappingError::session("The reflector cache is poisoned"))?;
        Ok(cache.entry(key).or_insert(descriptor).clone())
    }

    fn build(
        &self,
        declaration: &'static Declaration,
        stack: &mut Vec<usize>,
    ) -> Result<TableDescriptor> {
        let name = if declaration.table.is_empty() {
            self.mapper.table_name(declaration.name)
        } else {
            declaration.table.to_string()
        };
        let mut builder = Builder {
            reflector: self,
            root: declaration,
            stack,
            table: TableDescriptor {
                type_name: declaration.name,
                name,
                columns: Vec::new(),
                primary_key: Vec::new(),
                indexes: Vec::new(),
                uniques: Vec::new(),
                extends: Vec::new(),
                auto_increment: None,
                version: None,
                cascades: Vec::new(),
                slots: 0,
            },
            index_groups: Vec::new(),
            unique_groups: Vec::new(),
            associations: 0,
        };
        builder.walk(declaration, 0)?;
        builder.finish()
    }
}

struct Builder<'r, 's> {
    reflector: &'r Reflector,
    root: &'static Declaration,
    stack: &'s mut Vec<usize>,
    table: TableDescriptor,
    index_groups: Vec<(String, Vec<String>)>,
    unique_groups: Vec<(String, Vec<String>)>,
    associations: usize,
}

impl Builder<'_, '_> {
    fn error(&self, message: impl Into<String>) -> crate::Error {
        MappingError::configuration(self.root.name, message)
    }

    fn walk(&mut self, declaration: &'static Declaration, depth: usize) -> Result<()> {
        for field in declaration.fields {
            let tag = FieldTag::parse(field.tag).map_err(|e| {
                self.error(format!("field `{}`: {e}", field.name))
            })?;
            let slot = self.table.slots;
            match field.kind {
                FieldKind::Skip => {
                    self.table.slots += 1;
                }
                FieldKind::Scalar { .. } if tag.skip => {
                    self.table.slots += 1;
                }
                FieldKind::Scalar {
                    prototype,
                    optional,
                } => {
                    self.table.slots += 1;
                    let prototype = prototype();
                    self.push_column(field.name, slot, prototype, optional, &tag, None)?;
                }
                FieldKind::Extends(child) => {
                    if depth > 0 {
                        return Err(self.error(format!(
                            "field `{}`: `extends` can only be used one level deep",
                            field.name
                        )));
                    }
                    let child = child();
                    self.table.extends.push(child.name);
                    self.walk(child, depth + 1)?;
                }
                FieldKind::Cascade(child) => {
                    self.table.slots += 1;
                    let child = child();
                    let table = self.reflector.describe_nested(child, self.stack)?;
                    let [key] = table.primary_key.as_slice() else {
                        return Err(self.error(format!(
                            "field `{}`: the associated entity `{}` must have exactly one primary key column",
                            field.name, child.name
                        )));
                    };
                    let prototype = table.columns[*key].prototype.clone();
                    let association = Association {
                        index: self.associations,
                        declaration: child,
                        table: table.clone(),
                    };
                    self.associations += 1;
                    self.push_column(field.name, slot, prototype, true, &tag, Some(association))?;
                }
            }
        }
        Ok(())
    }

    fn push_column(
        &mut self,
        field: &'static str,
        slot: usize,
        prototype: crate::Value,
        optional: bool,
        tag: &FieldTag,
        association: Option<Association>,
    ) -> Result<()> {
        let name = match &tag.column {
            Some(name) => name.clone(),
            None if association.is_some() => {
                format!("{}_id", self.reflector.mapper.column_name(field))
            }
            None => self.reflector.mapper.column_name(field),
        };
        if self.table.columns.iter().any(|c| c.name == name) {
            return Err(self.error(format!("duplicate column `{name}`")));
        }
        let index = self.table.columns.len();
        let primary_key = tag.primary_key;
        if tag.auto_increment {
            if !primary_key {
                return Err(self.error(format!("`{field}`: autoincr requires pk")));
            }
            if !prototype.is_integer() {
                return Err(self.error(format!("`{field}`: autoincr requires an integer field")));
            }
            if self.table.auto_increment.replace(index).is_some() {
                return Err(self.error("only one autoincr column is allowed"));
            }
        }
        if tag.version {
            if !prototype.is_integer() {
                return Err(self.error(format!("`{field}`: version requires an integer field")));
            }
            if self.table.version.replace(index).is_some() {
                return Err(self.error("only one version column is allowed"));
            }
        }
        if (tag.created || tag.updated) && !(prototype.is_temporal() || prototype.is_integer()) {
            return Err(self.error(format!(
                "`{field}`: created and updated require a temporal or integer field"
            )));
        }
        if association.is_none() && (tag.extends || tag.cascade) {
            return Err(self.error(format!(
                "`{field}`: extends and cascade are decided when the entity is derived"
            )));
        }
        let mut unique = false;
        for group in &tag.uniques {
            if group.is_empty() {
                unique = true;
            } else {
                add_to_group(&mut self.unique_groups, group, &name);
            }
        }
        for group in &tag.indexes {
            let group = if group.is_empty() { &name } else { group };
            add_to_group(&mut self.index_groups, group, &name);
        }
        if primary_key {
            self.table.primary_key.push(index);
        }
        if association.is_some() {
            self.table.cascades.push(index);
        }
        self.table.columns.push(ColumnDescriptor {
            field,
            name,
            slot,
            prototype,
            sql_type: tag.sql_type.clone(),
            optional,
            nullable: !primary_key && !tag.not_null.unwrap_or(false),
            default: tag.default.clone(),
            primary_key,
            auto_increment: tag.auto_increment,
            unique,
            indexed: !tag.indexes.is_empty(),
            version: tag.version,
            created: tag.created,
            updated: tag.updated,
            association,
        });
        Ok(())
    }

    fn finish(mut self) -> Result<TableDescriptor> {
        if self.table.columns.is_empty() {
            return Err(self.error("no persisted columns"));
        }
        let table = &self.table.name;
        self.table.indexes = self
            .index_groups
            .into_iter()
            .map(|(group, columns)| IndexDescriptor {
                name: format!("IDX_{table}_{group}"),
                columns,
                unique: false,
            })
            .collect();
        self.table.uniques = self
            .unique_groups
            .into_iter()
            .map(|(group, columns)| IndexDescriptor {
                name: format!("UQE_{table}_{group}"),
                columns,
                unique: true,
            })
            .collect();
        Ok(self.table)
    }
}

fn add_to_group(groups: &mut Vec<(String, Vec<String>)>, group: &str, column: &str) {
    match groups.iter_mut().find(|(name, _)| name == group) {
        Some((_, columns)) => columns.push(column.to_string()),
        None => groups.push((group.to_string(), vec![column.to_string()])),
    }
}
