//! Document-store seam. Controllers talk to a [`DocumentStore`]; the MongoDB
//! implementation below is used by the CLI and the in-memory one by tests.

use mongodb::bson::{Document, doc};
use mongodb::sync::{Client, Database};
use tracing::debug;

use crate::raptors::etl::error::Result;

/// Operations the pipeline needs from a document database. All calls are
/// scoped to one database.
pub trait DocumentStore {
    /// Name of the database the store operates on.
    fn database_name(&self) -> &str;

    /// Documents matching `filter`, with `projection` applied when given.
    fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>>;

    /// Output of an aggregation pipeline.
    fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    fn count(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Removes every matching document and returns how many were removed.
    fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    fn insert_one(&self, collection: &str, document: Document) -> Result<()>;
}

/// Projection hiding the bookkeeping fields from read results.
pub fn hidden_fields() -> Document {
    doc! { "_id": 0, "timestamp": 0 }
}

/// [`DocumentStore`] backed by the synchronous MongoDB driver.
pub struct MongoStore {
    database: Database,
    name: String,
}

impl MongoStore {
    /// Connects to `uri` and selects `database`.
    pub fn connect(uri: &str, database: &str) -> Result<Self> {
        debug!(uri, database, "connecting to MongoDB");
        let client = Client::with_uri_str(uri)?;
        Ok(Self {
            database: client.database(database),
            name: database.to_string(),
        })
    }
}

impl DocumentStore for MongoStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>> {
        let handle = self.database.collection::<Document>(collection);
        let mut action = handle.find(filter);
        if let Some(projection) = projection {
            action = action.projection(projection);
        }
        let cursor = action.run()?;
        Ok(cursor.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self
            .database
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .run()?;
        Ok(cursor.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        Ok(self
            .database
            .collection::<Document>(collection)
            .count_documents(filter)
            .run()?)
    }

    fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .database
            .collection::<Document>(collection)
            .delete_many(filter)
            .run()?;
        Ok(result.deleted_count)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.database
            .collection::<Document>(collection)
            .insert_one(document)
            .run()?;
        Ok(())
    }
}
