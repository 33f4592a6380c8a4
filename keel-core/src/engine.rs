use crate::{
    Codec, Declaration, Driver, Entity, FindTarget, JoinType, NameMapper, Params, Reflector,
    Result, RowCache, RowLabeled, RowsAffected, Session, SnakeMapper, TableDescriptor,
    TableMeta, Value,
};
use std::sync::Arc;

/// Shared entry point: a driver, its connection URL, the reflector and the row cache.
///
/// Cloning is cheap, every clone shares the same reflector and cache. Each session opens its
/// own connection. Calling a builder method or an operation directly on the engine runs it
/// through an implicit session that releases its connection as soon as the operation ends.
pub struct Engine<D: Driver> {
    pub(crate) driver: Arc<D>,
    pub(crate) url: Arc<str>,
    pub(crate) reflector: Arc<Reflector>,
    pub(crate) cache: Option<Arc<dyn RowCache>>,
    pub(crate) codec: Codec,
}

impl<D: Driver> Clone for Engine<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            url: self.url.clone(),
            reflector: self.reflector.clone(),
            cache: self.cache.clone(),
            codec: self.codec,
        }
    }
}

macro_rules! implicit {
    ($name:ident$(<$($generic:ident: $bound:path),+>)?($($arg:ident: $ty:ty),*)) => {
        pub fn $name$(<$($generic: $bound),+>)?(&self, $($arg: $ty),*) -> Session<D> {
            let mut session = self.implicit_session();
            session.$name($($arg),*);
            session
        }
    };
}

impl<D: Driver> Engine<D> {
    /// Engine mapping names with [`SnakeMapper`], without row cache.
    pub fn new(driver: D, url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            driver: Arc::new(driver),
            url: url.into(),
            reflector: Arc::new(Reflector::new(Arc::new(SnakeMapper))),
            cache: None,
            codec: Codec::default(),
        }
    }

    /// Replace the name mapper. Descriptors already built are discarded.
    pub fn with_mapper(mut self, mapper: Arc<dyn NameMapper>) -> Self {
        self.reflector = Arc::new(Reflector::new(mapper));
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn RowCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Store booleans with the backend boolean type instead of `0`/`1`.
    pub fn native_bool(mut self, native: bool) -> Self {
        self.codec = Codec::new(native);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn reflector(&self) -> &Reflector {
        &self.reflector
    }

    pub fn cache(&self) -> Option<&Arc<dyn RowCache>> {
        self.cache.as_ref()
    }

    /// Table descriptor of `E`, built on first use.
    pub fn describe<E: Entity>(&self) -> Result<Arc<TableDescriptor>> {
        self.reflector.describe::<E>()
    }

    /// A session keeping its connection until it is closed or dropped.
    pub fn new_session(&self) -> Session<D> {
        Session::new(self.clone(), false)
    }

    fn implicit_session(&self) -> Session<D> {
        Session::new(self.clone(), true)
    }

    implicit!(filter(fragment: &str, params: impl Params));
    implicit!(and(fragment: &str, params: impl Params));
    implicit!(or(fragment: &str, params: impl Params));
    implicit!(id(key: impl Params));
    implicit!(table(name: impl Into<String>));
    implicit!(join(join_type: JoinType, table: impl Into<String>, on: &str, params: impl Params));
    implicit!(group_by(fragment: &str));
    implicit!(having(fragment: &str, params: impl Params));
    implicit!(order_by(fragment: &str));
    implicit!(limit(limit: u64));
    implicit!(offset(offset: u64));
    implicit!(distinct());
    implicit!(no_cache());
    implicit!(use_bool());
    implicit!(no_auto_time());
    implicit!(in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>));
    implicit!(cols<S: Into<String>>(columns: impl IntoIterator<Item = S>));
    implicit!(omit<S: Into<String>>(columns: impl IntoIterator<Item = S>));
    implicit!(asc<S: Into<String>>(columns: impl IntoIterator<Item = S>));
    implicit!(desc<S: Into<String>>(columns: impl IntoIterator<Item = S>));

    pub fn table_of<E: Entity>(&self) -> Session<D> {
        let mut session = self.implicit_session();
        session.table_of::<E>();
        session
    }

    pub async fn insert<E: Entity>(&self, value: &mut E) -> Result<RowsAffected> {
        self.implicit_session().insert(value).await
    }

    pub async fn insert_many<E: Entity>(&self, values: &mut [E]) -> Result<u64> {
        self.implicit_session().insert_many(values).await
    }

    pub async fn update<E: Entity>(&self, value: &mut E) -> Result<RowsAffected> {
        self.implicit_session().update(value).await
    }

    pub async fn update_by<E: Entity, C: Entity>(
        &self,
        value: &mut E,
        filter: &C,
    ) -> Result<RowsAffected> {
        self.implicit_session().update_by(value, filter).await
    }

    pub async fn delete<E: Entity>(&self, value: &E) -> Result<RowsAffected> {
        self.implicit_session().delete(value).await
    }

    pub async fn get<E: Entity>(&self, value: &mut E) -> Result<bool> {
        self.implicit_session().get(value).await
    }

    pub async fn find<T: FindTarget>(&self, target: &mut T) -> Result<()> {
        self.implicit_session().find(target).await
    }

    pub async fn find_by<T: FindTarget>(&self, target: &mut T, filter: &T::Entity) -> Result<()> {
        self.implicit_session().find_by(target, filter).await
    }

    pub async fn count<E: Entity>(&self, filter: &E) -> Result<i64> {
        self.implicit_session().count(filter).await
    }

    pub async fn iterate<E, F>(&self, filter: &E, visitor: F) -> Result<()>
    where
        E: Entity + Default,
        F: FnMut(usize, E) -> Result<()> + Send,
    {
        self.implicit_session().iterate(filter, visitor).await
    }

    pub async fn create_table<E: Entity>(&self) -> Result<()> {
        self.implicit_session().create_table::<E>().await
    }

    pub async fn create_tables(&self, declarations: &[&'static Declaration]) -> Result<()> {
        self.implicit_session().create_tables(declarations).await
    }

    pub async fn drop_table<E: Entity>(&self) -> Result<()> {
        self.implicit_session().drop_table::<E>().await
    }

    pub async fn drop_tables(&self, declarations: &[&'static Declaration]) -> Result<()> {
        self.implicit_session().drop_tables(declarations).await
    }

    pub async fn create_indexes<E: Entity>(&self) -> Result<()> {
        self.implicit_session().create_indexes::<E>().await
    }

    pub async fn create_uniques<E: Entity>(&self) -> Result<()> {
        self.implicit_session().create_uniques::<E>().await
    }

    pub async fn sync(&self, declarations: &[&'static Declaration]) -> Result<()> {
        self.implicit_session().sync(declarations).await
    }

    pub async fn db_metas(&self) -> Result<Vec<TableMeta>> {
        self.implicit_session().db_metas().await
    }

    pub async fn query(&self, sql: &str, params: impl Params) -> Result<Vec<RowLabeled>> {
        self.implicit_session().query(sql, params).await
    }

    pub async fn exec(&self, sql: &str, params: impl Params) -> Result<RowsAffected> {
        self.implicit_session().exec(sql, params).await
    }

    pub async fn query_entities<E: Entity + Default>(
        &self,
        sql: &str,
        params: impl Params,
    ) -> Result<Vec<E>> {
        self.implicit_session().query_entities(sql, params).await
    }
}
