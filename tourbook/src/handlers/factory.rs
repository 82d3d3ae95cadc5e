//! Resource handler factory
//!
//! [`ResourceHandlers`] produces the five CRUD handlers for any registered
//! entity. Each returns a [`MethodRouter`] so routers can attach access
//! control per method:
//!
//! ```rust,ignore
//! let tours = ResourceHandlers::new(TOUR).populate(tour::reviews());
//! Router::new()
//!     .route("/", tours.get_all().merge(tours.create_one()))
//!     .route("/{id}", tours.get_one().merge(tours.update_one()).merge(tours.delete_one()))
//! ```
//!
//! Every failure is returned as [`Error`] and rendered by the error stage.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, patch, post, MethodRouter},
};

use super::envelope::{no_content, Envelope};
use super::extract::{JsonBody, Params};
use crate::error::{Error, Result};
use crate::features::{QueryFeatures, RequestParams};
use crate::model::{Populate, UpdateOptions, NOT_FOUND_MESSAGE};
use crate::state::AppState;
use crate::store::Document;

/// Default path parameter carrying the record id
pub const ID_PARAM: &str = "id";

#[derive(Debug, Clone, Copy)]
struct ParentScope {
    param: &'static str,
    field: &'static str,
}

/// CRUD handlers for one entity
#[derive(Debug, Clone)]
pub struct ResourceHandlers {
    entity: &'static str,
    id_param: &'static str,
    populate: Option<Populate>,
    parent: Option<ParentScope>,
}

fn not_found() -> Error {
    Error::NotFound(NOT_FOUND_MESSAGE.to_string())
}


impl ResourceHandlers {
    /// Handlers for the entity registered as `entity`
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            id_param: ID_PARAM,
            populate: None,
            parent: None,
        }
    }

    /// Read the record id from path parameter `name` instead of `id`
    #[must_use]
    pub fn id_param(mut self, name: &'static str) -> Self {
        self.id_param = name;
        self
    }

    /// Eager-load `directive` on get-one
    #[must_use]
    pub fn populate(mut self, directive: Populate) -> Self {
        self.populate = Some(directive);
        self
    }

    /// Scope get-all to records whose `field` equals path parameter `param`,
    /// when the route supplies it
    #[must_use]
    pub fn scoped_by(mut self, param: &'static str, field: &'static str) -> Self {
        self.parent = Some(ParentScope { param, field });
        self
    }

    /// Entity name
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    fn record_id<'p>(&self, path: &'p HashMap<String, String>) -> Result<&'p str> {
        path.get(self.id_param)
            .map(String::as_str)
            .ok_or_else(|| Error::Internal(format!("Route has no {{{}}} parameter", self.id_param)))
    }

    /// All visible records refined by the query string
    pub async fn list(
        &self,
        state: &AppState,
        path: &HashMap<String, String>,
        params: RequestParams,
    ) -> Result<Envelope> {
        let model = state.db().model(self.entity)?;
        let mut query = model.find();
        if let Some(scope) = self.parent {
            if let Some(parent) = path.get(scope.param) {
                query = query.where_eq(scope.field, parent.clone());
            }
        }
        let docs = QueryFeatures::new(query, params)
            .filter()
            .sort()
            .limit_fields()
            .paginate()
            .exec()
            .await?;
        Ok(Envelope::list(docs))
    }

    /// One record, with the configured population
    pub async fn read(&self, state: &AppState, id: &str) -> Result<Envelope> {
        let model = state.db().model(self.entity)?;
        let mut query = model.find_by_id(id);
        if let Some(directive) = &self.populate {
            query = query.populate(directive.clone());
        }
        let doc = query.exec_one().await?.ok_or_else(not_found)?;
        Ok(Envelope::item(doc))
    }

    /// Persist a new record; `201 Created`
    pub async fn create(&self, state: &AppState, body: Document) -> Result<Envelope> {
        let created = state.db().model(self.entity)?.create(body).await?;
        Ok(Envelope::item(created).with_code(StatusCode::CREATED))
    }

    /// Partial update with validators
    pub async fn update(&self, state: &AppState, id: &str, body: Document) -> Result<Envelope> {
        let updated = state
            .db()
            .model(self.entity)?
            .update_by_id(id, body, UpdateOptions::default())
            .await?
            .ok_or_else(not_found)?;
        Ok(Envelope::item(updated))
    }

    /// Remove a record
    pub async fn remove(&self, state: &AppState, id: &str) -> Result<()> {
        state
            .db()
            .model(self.entity)?
            .delete_by_id(id)
            .await?
            .ok_or_else(not_found)?;
        Ok(())
    }

    /// `GET` collection handler
    pub fn get_all(&self) -> MethodRouter<AppState> {
        let this = self.clone();
        get(
            move |State(state): State<AppState>,
                  path: Option<Path<HashMap<String, String>>>,
                  Params(params): Params| async move {
                let path = path.map(|Path(p)| p).unwrap_or_default();
                this.list(&state, &path, params).await
            },
        )
    }

    /// `GET` item handler
    pub fn get_one(&self) -> MethodRouter<AppState> {
        let this = self.clone();
        get(
            move |State(state): State<AppState>, Path(path): Path<HashMap<String, String>>| async move {
                this.read(&state, this.record_id(&path)?).await
            },
        )
    }

    /// `POST` collection handler
    pub fn create_one(&self) -> MethodRouter<AppState> {
        let this = self.clone();
        post(move |State(state): State<AppState>, JsonBody(body): JsonBody| async move {
            this.create(&state, body).await
        })
    }

    /// `PATCH` item handler
    pub fn update_one(&self) -> MethodRouter<AppState> {
        let this = self.clone();
        patch(
            move |State(state): State<AppState>,
                  Path(path): Path<HashMap<String, String>>,
                  JsonBody(body): JsonBody| async move {
                this.update(&state, this.record_id(&path)?, body).await
            },
        )
    }

    /// `DELETE` item handler; `204` with an empty body
    pub fn delete_one(&self) -> MethodRouter<AppState> {
        let this = self.clone();
        delete(
            move |State(state): State<AppState>, Path(path): Path<HashMap<String, String>>| async move {
                this.remove(&state, this.record_id(&path)?).await?;
                Ok::<Response, Error>(no_content())
            },
        )
    }
}
