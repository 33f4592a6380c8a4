use crate::{
    Connection, Context, Declaration, Decoded, Driver, Engine, Entity, Error, Executor,
    JoinType, MappingError, Params, Planner, ProjectionPlan, Query, Result, RowLabeled,
    RowsAffected, Sql, SqlWriter, Statement, TableDescriptor, TableMeta, TableTarget, Value,
    cache_key, decode_row, next_version, render_select,
    stream::{StreamExt, TryStreamExt},
    truncate_long,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    hash::Hash,
    mem,
    pin::pin,
    sync::Arc,
};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Every operation commits on its own.
    Idle,
    /// Inside a transaction opened by [`Session::begin`].
    Active,
    /// Closed, every operation fails.
    Closed,
}

/// Destination of [`Session::find`]: a vector, or a map keyed by primary key.
pub trait FindTarget: Send {
    type Entity: Entity + Default;

    /// `key` holds the primary key values when the projection selected them.
    fn push(&mut self, key: Option<Vec<Value>>, entity: Self::Entity) -> Result<()>;
}

impl<E: Entity + Default> FindTarget for Vec<E> {
    type Entity = E;
    fn push(&mut self, _key: Option<Vec<Value>>, entity: E) -> Result<()> {
        Vec::push(self, entity);
        Ok(())
    }
}

fn single_key<K: crate::AsValue>(key: Option<Vec<Value>>) -> Result<K> {
    let Some(mut key) = key else {
        return Err(MappingError::validation(
            "A map destination needs the primary key in the projection",
        ));
    };
    if key.len() != 1 {
        return Err(MappingError::validation(
            "A map destination needs an entity with a single primary key column",
        ));
    }
    K::try_from_value(key.remove(0))
}

impl<K, E> FindTarget for HashMap<K, E>
where
    K: crate::AsValue + Eq + Hash + Send,
    E: Entity + Default,
{
    type Entity = E;
    fn push(&mut self, key: Option<Vec<Value>>, entity: E) -> Result<()> {
        self.insert(single_key(key)?, entity);
        Ok(())
    }
}

impl<K, E> FindTarget for BTreeMap<K, E>
where
    K: crate::AsValue + Ord + Send,
    E: Entity + Default,
{
    type Entity = E;
    fn push(&mut self, key: Option<Vec<Value>>, entity: E) -> Result<()> {
        self.insert(single_key(key)?, entity);
        Ok(())
    }
}

/// A unit of work on one connection.
///
/// Builder calls accumulate in the session and are consumed by the next terminal
/// operation. Outside a transaction every operation commits on its own; between
/// [`Session::begin`] and [`Session::commit`] (or [`Session::rollback`]) they share one
/// transaction. The connection is opened on first use.
pub struct Session<D: Driver> {
    engine: Engine<D>,
    connection: Option<D::Connection>,
    state: SessionState,
    statement: Statement,
    /// Created by the engine for a single operation, the connection is released after it.
    implicit: bool,
    /// Rows written by the open transaction, `None` key for whole tables.
    touched: HashSet<(String, Option<String>)>,
}

macro_rules! builder {
    ($(#[$meta:meta])* $name:ident($($arg:ident: $ty:ty),*)) => {
        $(#[$meta])*
        pub fn $name(&mut self, $($arg: $ty),*) -> &mut Self {
            self.statement.$name($($arg),*);
            self
        }
    };
}

impl<D: Driver> Session<D> {
    pub(crate) fn new(engine: Engine<D>, implicit: bool) -> Self {
        Self {
            engine,
            connection: None,
            state: SessionState::Idle,
            statement: Statement::default(),
            implicit,
            touched: HashSet::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine(&self) -> &Engine<D> {
        &self.engine
    }

    builder!(
        /// Raw predicate with `?` placeholders.
        filter(fragment: &str, params: impl Params)
    );
    builder!(and(fragment: &str, params: impl Params));
    builder!(or(fragment: &str, params: impl Params));
    builder!(id(key: impl Params));
    builder!(table(name: impl Into<String>));
    builder!(
        join(join_type: JoinType, table: impl Into<String>, on: &str, params: impl Params)
    );
    builder!(group_by(fragment: &str));
    builder!(having(fragment: &str, params: impl Params));
    builder!(order_by(fragment: &str));
    builder!(limit(limit: u64));
    builder!(offset(offset: u64));
    builder!(distinct());
    builder!(no_cache());
    builder!(use_bool());
    builder!(no_auto_time());

    pub fn in_list<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.statement.in_list(column, values);
        self
    }

    pub fn cols<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.statement.cols(columns);
        self
    }

    pub fn omit<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.statement.omit(columns);
        self
    }

    pub fn asc<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.statement.asc(columns);
        self
    }

    pub fn desc<S: Into<String>>(&mut self, columns: impl IntoIterator<Item = S>) -> &mut Self {
        self.statement.desc(columns);
        self
    }

    pub fn table_of<E: Entity>(&mut self) -> &mut Self {
        self.statement.table_of::<E>();
        self
    }

    fn check_open(&self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(MappingError::session("The session is closed"));
        }
        Ok(())
    }

    /// Consume the builder state, failing on a closed session or a deferred builder error.
    fn take_statement(&mut self) -> Result<Statement> {
        let mut statement = mem::take(&mut self.statement);
        self.check_open()?;
        if let Some(error) = statement.pending_error.take() {
            return Err(Error::new(error));
        }
        Ok(statement)
    }

    async fn connection(&mut self) -> Result<&mut D::Connection> {
        self.check_open()?;
        if self.connection.is_none() {
            let connection = D::Connection::connect(&self.engine.url)
                .await
                .with_context(|| format!("While connecting to {}", D::NAME))?;
            self.connection = Some(connection);
        }
        self.connection
            .as_mut()
            .ok_or_else(|| MappingError::session("The session has no connection"))
    }

    /// Implicit sessions give their connection back after each operation.
    fn release(&mut self) {
        if self.implicit && self.state == SessionState::Idle {
            self.connection = None;
        }
    }

    async fn prepare(connection: &mut D::Connection, sql: Sql) -> Result<Query<D>> {
        log::debug!("{}", truncate_long!(sql.text));
        if sql.params.is_empty() {
            return Ok(Query::Raw(sql.text));
        }
        let context = || format!("While preparing:\n{}", truncate_long!(sql.text));
        let mut query = connection.prepare(sql.text.clone()).await.with_context(context)?;
        for param in sql.params {
            query.bind(param).with_context(context)?;
        }
        Ok(query)
    }

    async fn execute_sql(&mut self, sql: Sql) -> Result<RowsAffected> {
        let context = format!("While executing:\n{}", truncate_long!(sql.text));
        let connection = self.connection().await?;
        let query = Self::prepare(connection, sql).await?;
        connection.execute(query).await.context(context)
    }

    async fn fetch_sql(&mut self, sql: Sql) -> Result<Vec<RowLabeled>> {
        let context = format!("While fetching:\n{}", truncate_long!(sql.text));
        let connection = self.connection().await?;
        let query = Self::prepare(connection, sql).await?;
        connection.fetch(query).try_collect().await.context(context)
    }

    async fn fetch_one(&mut self, sql: Sql) -> Result<Option<RowLabeled>> {
        let context = format!("While fetching:\n{}", truncate_long!(sql.text));
        let connection = self.connection().await?;
        let query = Self::prepare(connection, sql).await?;
        let mut stream = pin!(connection.fetch(query));
        stream.next().await.transpose().context(context)
    }

    fn writer(&self) -> D::SqlWriter {
        self.engine.driver.sql_writer()
    }

    fn describe<E: Entity>(&self) -> Result<Arc<TableDescriptor>> {
        self.engine.reflector.describe::<E>()
    }

    fn table_name(&self, table: &TableDescriptor, statement: &Statement) -> Result<String> {
        Ok(match &statement.table {
            Some(TableTarget::Name(name)) => name.clone(),
            Some(TableTarget::Entity(declaration)) => self
                .engine
                .reflector
                .describe_declaration(declaration)?
                .name
                .clone(),
            None => table.name.clone(),
        })
    }

    /// Slot values of `value`, cascade slots holding the key of the associated entity.
    fn slots_of(&self, table: &TableDescriptor, value: &dyn Entity) -> Result<Vec<Value>> {
        let mut slots = Vec::with_capacity(table.slots);
        value.write_fields(&mut slots);
        if slots.len() != table.slots {
            return Err(MappingError::configuration(
                table.type_name,
                format!("expected {} field slots, got {}", table.slots, slots.len()),
            ));
        }
        let associations = value.associations();
        for &i in &table.cascades {
            let column = &table.columns[i];
            if let Some(association) = &column.association
                && let Some(child) = associations.get(association.index)
            {
                let mut child_slots = Vec::with_capacity(association.table.slots);
                child.write_fields(&mut child_slots);
                if let Some(key) = association.table.primary_key_columns().next()
                    && let Some(key) = child_slots.get(key.slot)
                {
                    slots[column.slot] = key.clone();
                }
            }
        }
        Ok(slots)
    }

    /// Store a decoded row into `value`, associations get their key.
    fn apply(table: &TableDescriptor, decoded: Decoded, value: &mut dyn Entity) -> Result<()> {
        value
            .read_fields(&mut decoded.slots.into_iter())
            .with_context(|| format!("While decoding a row of `{}`", table.name))?;
        if decoded.associations.is_empty() {
            return Ok(());
        }
        let mut associations = value.associations_mut();
        for (index, key) in decoded.associations {
            let Some(association) = table
                .columns
                .iter()
                .filter_map(|c| c.association.as_ref())
                .find(|a| a.index == index)
            else {
                continue;
            };
            let Some(child) = associations.get_mut(index) else {
                continue;
            };
            let child_table = &association.table;
            let mut slots = vec![None; child_table.slots];
            if let Some(column) = child_table.primary_key_columns().next() {
                slots[column.slot] = Some(key);
            }
            child.read_fields(&mut slots.into_iter())?;
        }
        Ok(())
    }

    fn is_touched(&self, table: &str, key: &str) -> bool {
        self.touched.contains(&(table.to_string(), None))
            || self
                .touched
                .contains(&(table.to_string(), Some(key.to_string())))
    }

    /// Invalidate the rows written by an operation, remembering them inside a transaction.
    fn invalidate(&mut self, table: &str, key: Option<String>) {
        if let Some(cache) = &self.engine.cache {
            match &key {
                Some(key) => cache.invalidate(table, key),
                None => cache.invalidate_table(table),
            }
        }
        if self.state == SessionState::Active {
            self.touched.insert((table.to_string(), key));
        }
    }

    pub async fn begin(&mut self) -> Result<()> {
        self.check_open()?;
        if self.state == SessionState::Active {
            return Err(MappingError::session("A transaction is already open"));
        }
        let mut sql = Sql::new();
        self.writer().write_transaction_begin(&mut sql.text);
        self.execute_sql(sql).await?;
        self.state = SessionState::Active;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.end(true).await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.end(false).await
    }

    async fn end(&mut self, commit: bool) -> Result<()> {
        self.check_open()?;
        if self.state != SessionState::Active {
            return Err(MappingError::session(if commit {
                "Cannot commit, no transaction is open"
            } else {
                "Cannot roll back, no transaction is open"
            }));
        }
        let mut sql = Sql::new();
        if commit {
            self.writer().write_transaction_commit(&mut sql.text);
        } else {
            self.writer().write_transaction_rollback(&mut sql.text);
        }
        let result = self.execute_sql(sql).await;
        self.state = SessionState::Idle;
        let touched = mem::take(&mut self.touched);
        if commit && let Some(cache) = &self.engine.cache {
            for (table, key) in touched {
                match key {
                    Some(key) => cache.invalidate(&table, &key),
                    None => cache.invalidate_table(&table),
                }
            }
        }
        self.release();
        result.map(|_| ())
    }

    /// Roll back the open transaction, if any, and release the connection.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let result = if self.state == SessionState::Active {
            self.rollback().await
        } else {
            Ok(())
        };
        self.state = SessionState::Closed;
        self.connection = None;
        self.statement = Statement::default();
        result
    }

    pub async fn insert<E: Entity>(&mut self, value: &mut E) -> Result<RowsAffected> {
        let statement = self.take_statement();
        let result = match statement {
            Ok(statement) => self.insert_one(&statement, value).await,
            Err(e) => Err(e),
        };
        self.release();
        result
    }

    /// One INSERT per value, stopping at the first failure. Returns the number of rows
    /// inserted. Atomic only inside a transaction.
    pub async fn insert_many<E: Entity>(&mut self, values: &mut [E]) -> Result<u64> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let mut count = 0;
            for value in values.iter_mut() {
                count += self.insert_one(&statement, value).await?.rows_affected;
            }
            Ok(count)
        }
        .await;
        self.release();
        result
    }

    async fn insert_one<E: Entity>(
        &mut self,
        statement: &Statement,
        value: &mut E,
    ) -> Result<RowsAffected> {
        let table = self.describe::<E>()?;
        let table_name = self.table_name(&table, statement)?;
        let planner = Planner::new(&table, &table_name, statement, self.engine.codec);
        let mut slots = self.slots_of(&table, &*value)?;
        let insert = planner.insert(&mut slots, OffsetDateTime::now_utc())?;
        let mut sql = Sql::new();
        self.writer().write_insert(&mut sql, &insert);
        let result = self.execute_sql(sql).await?;
        let mut written: Vec<Option<Value>> = vec![None; table.slots];
        for column in table.columns.iter().filter(|c| c.is_automatic()) {
            if insert.columns.contains(&column.name) {
                written[column.slot] = Some(slots[column.slot].clone());
            }
        }
        if let Some(i) = table.auto_increment {
            let column = &table.columns[i];
            if slots[column.slot].is_zero()
                && let Some(id) = result.last_affected_id
            {
                let id = self.engine.codec.decode(column, Value::Int64(Some(id)))?;
                slots[column.slot] = id.clone();
                written[column.slot] = Some(id);
            }
        }
        value.read_fields(&mut written.into_iter())?;
        let key = planner.key_of(&slots).as_deref().and_then(cache_key);
        self.invalidate(&table_name, key);
        Ok(result)
    }

    /// Update the row of `value`. The set is made of the explicit `cols`, or the non zero
    /// fields. The row is chosen by the builder conditions, or by the primary key of `value`.
    /// With neither, the whole table is updated when `use_bool` or `cols` is set. The version
    /// of `value` is bumped only when it took part in the condition.
    pub async fn update<E: Entity>(&mut self, value: &mut E) -> Result<RowsAffected> {
        self.update_with(value, None).await
    }

    /// Same as [`Session::update`] with the non zero fields of `filter` added to the condition.
    /// `filter` may be of any entity type, its fields are matched by column name.
    pub async fn update_by<E: Entity, C: Entity>(
        &mut self,
        value: &mut E,
        filter: &C,
    ) -> Result<RowsAffected> {
        self.update_with(value, Some(filter as &dyn Entity)).await
    }

    async fn update_with<E: Entity>(
        &mut self,
        value: &mut E,
        filter: Option<&dyn Entity>,
    ) -> Result<RowsAffected> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let table = self.describe::<E>()?;
            let table_name = self.table_name(&table, &statement)?;
            let codec = self.engine.codec;
            let planner = Planner::new(&table, &table_name, &statement, codec);
            let by_filter = filter.is_some();
            let filter = match filter {
                Some(filter) => {
                    let filter_table = self
                        .engine
                        .reflector
                        .describe_declaration(filter.declaration_of())?;
                    let filter_slots = self.slots_of(&filter_table, filter)?;
                    Planner::new(&filter_table, &table_name, &statement, codec)
                        .derived(&filter_slots)?
                }
                None => Vec::new(),
            };
            let mut slots = self.slots_of(&table, &*value)?;
            let update = planner.update(&mut slots, filter, OffsetDateTime::now_utc())?;
            let checks_version = table.version.is_some_and(|i| {
                !slots[table.columns[i].slot].is_zero()
            });
            let key = if statement.has_conditions() || by_filter {
                statement.id.as_deref().and_then(cache_key)
            } else {
                planner.key_of(&slots).as_deref().and_then(cache_key)
            };
            let mut sql = Sql::new();
            self.writer().write_update(&mut sql, &update);
            let mut result = self.execute_sql(sql).await?;
            self.invalidate(&table_name, key);
            if result.rows_affected == 0 {
                result.conflict = checks_version;
                return Ok(result);
            }
            let mut written: Vec<Option<Value>> = vec![None; table.slots];
            for column in &table.columns {
                if column.updated && !statement.no_auto_time {
                    written[column.slot] = Some(slots[column.slot].clone());
                } else if column.version && checks_version {
                    written[column.slot] = Some(next_version(&slots[column.slot]));
                }
            }
            value.read_fields(&mut written.into_iter())?;
            Ok(result)
        }
        .await;
        self.release();
        result
    }

    /// Delete the rows matching the builder conditions and the non zero fields of `value`.
    pub async fn delete<E: Entity>(&mut self, value: &E) -> Result<RowsAffected> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let table = self.describe::<E>()?;
            let table_name = self.table_name(&table, &statement)?;
            let planner = Planner::new(&table, &table_name, &statement, self.engine.codec);
            let slots = self.slots_of(&table, value)?;
            let delete = planner.delete(&slots)?;
            let key = statement
                .id
                .clone()
                .or_else(|| planner.key_of(&slots))
                .as_deref()
                .and_then(cache_key);
            let mut sql = Sql::new();
            self.writer().write_delete(&mut sql, &delete);
            let result = self.execute_sql(sql).await?;
            self.invalidate(&table_name, key);
            Ok(result)
        }
        .await;
        self.release();
        result
    }

    /// Load the first row matching the builder conditions and the non zero fields of `value`
    /// into `value`. Returns `false` when there is no such row. Associations are fetched by
    /// key, an association whose row is missing keeps only its key.
    pub async fn get<E: Entity>(&mut self, value: &mut E) -> Result<bool> {
        let statement = self.take_statement();
        let result = async {
            let mut statement = statement?;
            statement.limit = Some(1);
            let table = self.describe::<E>()?;
            let table_name = self.table_name(&table, &statement)?;
            let slots = self.slots_of(&table, &*value)?;
            let found = self
                .get_row(&table, &table_name, &statement, &slots, value)
                .await?;
            if found {
                self.fetch_associations(&table, value).await?;
            }
            Ok(found)
        }
        .await;
        self.release();
        result
    }

    async fn get_row(
        &mut self,
        table: &TableDescriptor,
        table_name: &str,
        statement: &Statement,
        slots: &[Value],
        value: &mut dyn Entity,
    ) -> Result<bool> {
        let codec = self.engine.codec;
        let planner = Planner::new(table, table_name, statement, codec);
        let mut filter = planner.conditions()?;
        filter.extend(planner.derived(slots)?);
        let (select, plan) = planner.select(filter)?;
        let cache = self
            .engine
            .cache
            .clone()
            .filter(|_| !statement.no_cache);
        let key = cache
            .as_ref()
            .and_then(|_| planner.lookup_key(slots))
            .filter(|key| !self.is_touched(table_name, key));
        if let (Some(cache), Some(key)) = (&cache, &key)
            && let Some(row) = cache.get(table_name, key)
        {
            let decoded = decode_row(table, &plan.positions, row.values.into_vec(), codec)?;
            Self::apply(table, decoded, value)?;
            return Ok(true);
        }
        let stamp = match (&cache, &key) {
            (Some(cache), Some(_)) => Some(cache.stamp(table_name)),
            _ => None,
        };
        let sql = render_select(&self.writer(), &select);
        let Some(row) = self.fetch_one(sql).await? else {
            return Ok(false);
        };
        if let (Some(cache), Some(key), Some(stamp)) = (&cache, &key, stamp)
            && self.state == SessionState::Idle
        {
            cache.put(table_name, key, row.clone(), stamp);
        }
        let decoded = decode_row(table, &plan.positions, row.values.into_vec(), codec)?;
        Self::apply(table, decoded, value)?;
        Ok(true)
    }

    async fn fetch_associations(
        &mut self,
        table: &TableDescriptor,
        value: &mut dyn Entity,
    ) -> Result<()> {
        let associations: Vec<_> = table
            .columns
            .iter()
            .filter_map(|c| c.association.clone())
            .collect();
        for association in associations {
            let child_table = association.table.clone();
            let key = {
                let children = value.associations();
                let Some(child) = children.get(association.index) else {
                    continue;
                };
                let slots = self.slots_of(&child_table, *child)?;
                let statement = Statement::default();
                Planner::new(&child_table, &child_table.name, &statement, self.engine.codec)
                    .key_of(&slots)
            };
            let Some(key) = key else {
                continue;
            };
            let mut statement = Statement::default();
            statement.id(key).limit(1);
            let slots = vec![Value::Null; child_table.slots];
            let mut children = value.associations_mut();
            let Some(child) = children.get_mut(association.index) else {
                continue;
            };
            let found = self
                .get_row(&child_table, &child_table.name, &statement, &slots, &mut **child)
                .await?;
            if !found {
                log::debug!(
                    "No `{}` row for the association of `{}`",
                    child_table.name,
                    table.name
                );
            }
        }
        Ok(())
    }

    /// Load every row matching the builder conditions into `target`.
    pub async fn find<T: FindTarget>(&mut self, target: &mut T) -> Result<()> {
        self.find_with(target, None).await
    }

    /// Same as [`Session::find`] with the non zero fields of `filter` added to the condition.
    pub async fn find_by<T: FindTarget>(&mut self, target: &mut T, filter: &T::Entity) -> Result<()> {
        self.find_with(target, Some(filter)).await
    }

    async fn find_with<T: FindTarget>(
        &mut self,
        target: &mut T,
        filter: Option<&T::Entity>,
    ) -> Result<()> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let table = self.describe::<T::Entity>()?;
            let table_name = self.table_name(&table, &statement)?;
            let (sql, plan) = self.select_sql(&table, &table_name, &statement, filter)?;
            let rows = self.fetch_sql(sql).await?;
            for row in rows {
                let decoded = decode_row(&table, &plan.positions, row.values.into_vec(), self.engine.codec)?;
                let key = table
                    .primary_key_columns()
                    .map(|c| decoded.slots[c.slot].clone())
                    .collect::<Option<Vec<_>>>();
                let mut entity = T::Entity::default();
                Self::apply(&table, decoded, &mut entity)?;
                target.push(key, entity)?;
            }
            Ok(())
        }
        .await;
        self.release();
        result
    }

    fn select_sql<E: Entity>(
        &self,
        table: &TableDescriptor,
        table_name: &str,
        statement: &Statement,
        filter: Option<&E>,
    ) -> Result<(Sql, ProjectionPlan)> {
        let planner = Planner::new(table, table_name, statement, self.engine.codec);
        let mut predicates = planner.conditions()?;
        if let Some(filter) = filter {
            predicates.extend(planner.derived(&self.slots_of(table, filter)?)?);
        }
        let (select, plan) = planner.select(predicates)?;
        Ok((render_select(&self.writer(), &select), plan))
    }

    /// Number of rows matching the builder conditions and the non zero fields of `filter`.
    pub async fn count<E: Entity>(&mut self, filter: &E) -> Result<i64> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let table = self.describe::<E>()?;
            let table_name = self.table_name(&table, &statement)?;
            let planner = Planner::new(&table, &table_name, &statement, self.engine.codec);
            let mut predicates = planner.conditions()?;
            predicates.extend(planner.derived(&self.slots_of(&table, filter)?)?);
            let (select, _) = planner.select(predicates)?;
            let mut sql = Sql::new();
            self.writer().write_count(&mut sql, &select);
            let row = self
                .fetch_one(sql)
                .await?
                .ok_or_else(|| Error::msg("The count query returned no row"))?;
            let value = row.values.into_vec().into_iter().next().unwrap_or_default();
            <i64 as crate::AsValue>::try_from_value(value)
        }
        .await;
        self.release();
        result
    }

    /// Stream the rows matching the builder conditions and the non zero fields of `filter`
    /// to `visitor`, with their position. Stops at the first error of the visitor and returns it.
    pub async fn iterate<E, F>(&mut self, filter: &E, mut visitor: F) -> Result<()>
    where
        E: Entity + Default,
        F: FnMut(usize, E) -> Result<()> + Send,
    {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let table = self.describe::<E>()?;
            let table_name = self.table_name(&table, &statement)?;
            let (sql, plan) = self.select_sql(&table, &table_name, &statement, Some(filter))?;
            let codec = self.engine.codec;
            let context = format!("While iterating:\n{}", truncate_long!(sql.text));
            let connection = self.connection().await?;
            let query = Self::prepare(connection, sql).await?;
            let mut stream = pin!(connection.fetch(query));
            let mut position = 0;
            while let Some(row) = stream.next().await {
                let row = row.with_context(|| context.clone())?;
                let decoded = decode_row(&table, &plan.positions, row.values.into_vec(), codec)?;
                let mut entity = E::default();
                Self::apply(&table, decoded, &mut entity)?;
                visitor(position, entity)?;
                position += 1;
            }
            Ok(())
        }
        .await;
        self.release();
        result
    }

    async fn run_ddl(&mut self, sql: String) -> Result<()> {
        let context = format!("While executing:\n{}", truncate_long!(sql));
        let connection = self.connection().await?;
        log::debug!("{}", truncate_long!(sql));
        connection.execute(Query::Raw(sql)).await.context(context)?;
        Ok(())
    }

    async fn ddl_for(
        &mut self,
        declarations: &[&'static Declaration],
        mut write: impl FnMut(&D::SqlWriter, &TableDescriptor, &str, &mut String),
    ) -> Result<()> {
        let statement = self.take_statement();
        let result = async {
            let statement = statement?;
            let writer = self.writer();
            for declaration in declarations {
                let table = self.engine.reflector.describe_declaration(declaration)?;
                let name = if declarations.len() == 1 {
                    self.table_name(&table, &statement)?
                } else {
                    table.name.clone()
                };
                let mut sql = String::new();
                write(&writer, &table, &name, &mut sql);
                if !sql.is_empty() {
                    self.run_ddl(sql).await?;
                }
            }
            Ok(())
        }
        .await;
        self.release();
        result
    }

    /// `CREATE TABLE`, failing when the table exists.
    pub async fn create_table<E: Entity>(&mut self) -> Result<()> {
        self.create_tables(&[E::declaration()]).await
    }

    pub async fn create_tables(&mut self, declarations: &[&'static Declaration]) -> Result<()> {
        self.ddl_for(declarations, |writer, table, name, out| {
            writer.write_create_table(out, table, name, false)
        })
        .await
    }

    /// `DROP TABLE IF EXISTS`.
    pub async fn drop_table<E: Entity>(&mut self) -> Result<()> {
        self.drop_tables(&[E::declaration()]).await
    }

    pub async fn drop_tables(&mut self, declarations: &[&'static Declaration]) -> Result<()> {
        let mut dropped = Vec::new();
        let result = self
            .ddl_for(declarations, |writer, _, name, out| {
                dropped.push(name.to_string());
                writer.write_drop_table(out, name, true)
            })
            .await;
        for name in dropped {
            self.invalidate(&name, None);
        }
        result
    }

    pub async fn create_indexes<E: Entity>(&mut self) -> Result<()> {
        self.ddl_for(&[E::declaration()], |writer, table, name, out| {
            for index in &table.indexes {
                writer.write_create_index(out, name, index, false);
            }
        })
        .await
    }

    pub async fn create_uniques<E: Entity>(&mut self) -> Result<()> {
        self.ddl_for(&[E::declaration()], |writer, table, name, out| {
            for unique in &table.uniques {
                writer.write_create_index(out, name, unique, false);
            }
        })
        .await
    }

    /// Create the missing tables, columns, indexes and uniques. Existing columns are never
    /// altered or dropped.
    pub async fn sync(&mut self, declarations: &[&'static Declaration]) -> Result<()> {
        let statement = self.take_statement();
        let result = async {
            statement?;
            let metas = self.connection().await?.db_metas().await?;
            let writer = self.writer();
            for declaration in declarations {
                let table = self.engine.reflector.describe_declaration(declaration)?;
                let mut statements = Vec::new();
                match metas.iter().find(|m| m.name == table.name) {
                    None => {
                        let mut sql = String::new();
                        writer.write_create_table(&mut sql, &table, &table.name, true);
                        statements.push(sql);
                    }
                    Some(meta) => {
                        for column in &table.columns {
                            if meta.column(&column.name).is_none() {
                                let mut sql = String::new();
                                writer.write_add_column(&mut sql, &table, &table.name, column);
                                statements.push(sql);
                            }
                        }
                    }
                }
                for index in table.indexes.iter().chain(&table.uniques) {
                    let mut sql = String::new();
                    writer.write_create_index(&mut sql, &table.name, index, true);
                    statements.push(sql);
                }
                for sql in statements {
                    self.run_ddl(sql).await?;
                }
            }
            Ok(())
        }
        .await;
        self.release();
        result
    }

    /// Tables, columns and indexes present in the database.
    pub async fn db_metas(&mut self) -> Result<Vec<TableMeta>> {
        let statement = self.take_statement();
        let result = async {
            statement?;
            self.connection().await?.db_metas().await
        }
        .await;
        self.release();
        result
    }

    /// Raw query, rows as returned by the driver.
    pub async fn query(&mut self, sql: &str, params: impl Params) -> Result<Vec<RowLabeled>> {
        let statement = self.take_statement();
        let params = params.into_values();
        let result = async {
            statement?;
            let sql = self.raw_sql(sql, params)?;
            self.fetch_sql(sql).await
        }
        .await;
        self.release();
        result
    }

    /// Raw statement. The row cache is cleared, the written tables are unknown.
    pub async fn exec(&mut self, sql: &str, params: impl Params) -> Result<RowsAffected> {
        let statement = self.take_statement();
        let params = params.into_values();
        let result = async {
            statement?;
            let sql = self.raw_sql(sql, params)?;
            let result = self.execute_sql(sql).await;
            if let Some(cache) = &self.engine.cache {
                cache.clear();
            }
            result
        }
        .await;
        self.release();
        result
    }

    /// Raw query decoded into entities. Labels are matched to column names, then to field
    /// names through the name mapper. Unknown labels are ignored.
    pub async fn query_entities<E: Entity + Default>(
        &mut self,
        sql: &str,
        params: impl Params,
    ) -> Result<Vec<E>> {
        let statement = self.take_statement();
        let params = params.into_values();
        let result = async {
            statement?;
            let table = self.describe::<E>()?;
            let sql = self.raw_sql(sql, params)?;
            let rows = self.fetch_sql(sql).await?;
            let mut result = Vec::with_capacity(rows.len());
            let mut positions: Option<Vec<Option<usize>>> = None;
            for row in rows {
                let positions = positions.get_or_insert_with(|| {
                    row.labels
                        .iter()
                        .map(|label| self.label_position(&table, label))
                        .collect()
                });
                let decoded = decode_row(&table, positions, row.values.into_vec(), self.engine.codec)?;
                let mut entity = E::default();
                Self::apply(&table, decoded, &mut entity)?;
                result.push(entity);
            }
            Ok(result)
        }
        .await;
        self.release();
        result
    }

    fn label_position(&self, table: &TableDescriptor, label: &str) -> Option<usize> {
        table
            .columns
            .iter()
            .position(|c| c.name == label)
            .or_else(|| {
                let field = self.engine.reflector.mapper().field_name(label);
                table.columns.iter().position(|c| c.field == field)
            })
    }

    fn raw_sql(&self, sql: &str, params: Vec<Value>) -> Result<Sql> {
        Ok(Sql {
            text: sql.to_string(),
            params: params
                .into_iter()
                .map(|v| self.engine.codec.encode_value(v))
                .collect::<Result<_>>()?,
        })
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            log::warn!("Session dropped with an open transaction, the connection is closed and the transaction discarded");
        }
    }
}
