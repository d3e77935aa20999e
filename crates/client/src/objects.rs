//! Remote object wrappers: projects, datasets, images, annotations.
//!
//! A wrapper holds the server's last snapshot of an entity. Lookups return
//! partially loaded snapshots; `ensure_loaded` reloads the full record on
//! first use instead of intercepting field access. Saving goes through the
//! update service and replaces the local snapshot with the authoritative
//! one the server returns.

use mira_protocol::{
	AnnotationData, AnnotationKind, DatasetData, ImageData, ObjectKind, ObjectRef, ProjectData,
	ServiceName,
};
use serde_json::json;

use crate::error::{Error, Result};
use crate::session::Gateway;

/// A project with its lazily loaded dataset hierarchy.
pub struct ProjectWrapper {
	data: ProjectData,
	loaded: bool,
}

impl ProjectWrapper {
	/// Looks up a project by id; the snapshot is partial until
	/// [`ProjectWrapper::ensure_loaded`] runs.
	pub async fn fetch(gateway: &mut Gateway, id: i64) -> Result<Self> {
		let value = gateway
			.invoke(ServiceName::Query, "find", json!({ "kind": ObjectKind::Project, "id": id }))
			.await?;
		Ok(Self {
			data: serde_json::from_value(value)?,
			loaded: false,
		})
	}

	pub fn id(&self) -> i64 {
		self.data.id
	}

	pub fn name(&self) -> &str {
		&self.data.name
	}

	pub fn data(&self) -> &ProjectData {
		&self.data
	}

	pub fn set_name(&mut self, name: impl Into<String>) {
		self.data.name = name.into();
	}

	pub fn set_description(&mut self, description: impl Into<String>) {
		self.data.description = Some(description.into());
	}

	/// Reloads the full record, including the dataset hierarchy, if the
	/// current snapshot is partial.
	pub async fn ensure_loaded(&mut self, gateway: &mut Gateway) -> Result<()> {
		if self.loaded {
			return Ok(());
		}
		let value = gateway
			.invoke(
				ServiceName::Container,
				"loadHierarchy",
				json!({ "kind": ObjectKind::Project, "id": self.data.id }),
			)
			.await?;
		self.data = serde_json::from_value(value)?;
		self.loaded = true;
		Ok(())
	}

	/// Child datasets, loading the hierarchy on first use.
	pub async fn datasets(&mut self, gateway: &mut Gateway) -> Result<Vec<DatasetWrapper>> {
		self.ensure_loaded(gateway).await?;
		let ids = self.data.dataset_ids.clone().unwrap_or_default();
		let mut datasets = Vec::with_capacity(ids.len());
		for id in ids {
			datasets.push(DatasetWrapper::fetch(gateway, id).await?);
		}
		Ok(datasets)
	}

	/// Annotation links, fetched on demand and never cached locally.
	pub async fn annotations(&self, gateway: &mut Gateway) -> Result<Vec<AnnotationData>> {
		load_annotations(gateway, ObjectRef { kind: ObjectKind::Project, id: self.data.id }).await
	}

	/// Persists local edits; the server's returned snapshot replaces ours.
	pub async fn save(&mut self, gateway: &mut Gateway) -> Result<()> {
		let value = gateway
			.invoke_write(
				ServiceName::Update,
				"saveAndReturn",
				json!({ "kind": ObjectKind::Project, "object": self.data }),
			)
			.await?;
		self.data = serde_json::from_value(value)?;
		self.loaded = true;
		Ok(())
	}
}

/// A dataset with its lazily loaded image list.
pub struct DatasetWrapper {
	data: DatasetData,
	loaded: bool,
}

impl DatasetWrapper {
	pub async fn fetch(gateway: &mut Gateway, id: i64) -> Result<Self> {
		let value = gateway
			.invoke(ServiceName::Query, "find", json!({ "kind": ObjectKind::Dataset, "id": id }))
			.await?;
		Ok(Self {
			data: serde_json::from_value(value)?,
			loaded: false,
		})
	}

	pub fn id(&self) -> i64 {
		self.data.id
	}

	pub fn name(&self) -> &str {
		&self.data.name
	}

	pub fn data(&self) -> &DatasetData {
		&self.data
	}

	pub async fn ensure_loaded(&mut self, gateway: &mut Gateway) -> Result<()> {
		if self.loaded {
			return Ok(());
		}
		let value = gateway
			.invoke(
				ServiceName::Container,
				"loadHierarchy",
				json!({ "kind": ObjectKind::Dataset, "id": self.data.id }),
			)
			.await?;
		self.data = serde_json::from_value(value)?;
		self.loaded = true;
		Ok(())
	}

	pub async fn images(&mut self, gateway: &mut Gateway) -> Result<Vec<ImageWrapper>> {
		self.ensure_loaded(gateway).await?;
		let ids = self.data.image_ids.clone().unwrap_or_default();
		let mut images = Vec::with_capacity(ids.len());
		for id in ids {
			images.push(ImageWrapper::fetch(gateway, id).await?);
		}
		Ok(images)
	}

	pub async fn annotations(&self, gateway: &mut Gateway) -> Result<Vec<AnnotationData>> {
		load_annotations(gateway, ObjectRef { kind: ObjectKind::Dataset, id: self.data.id }).await
	}

	pub async fn save(&mut self, gateway: &mut Gateway) -> Result<()> {
		let value = gateway
			.invoke_write(
				ServiceName::Update,
				"saveAndReturn",
				json!({ "kind": ObjectKind::Dataset, "object": self.data }),
			)
			.await?;
		self.data = serde_json::from_value(value)?;
		self.loaded = true;
		Ok(())
	}
}

/// An image; pixel access goes through per-use services, not the wrapper.
pub struct ImageWrapper {
	data: ImageData,
}

impl ImageWrapper {
	pub async fn fetch(gateway: &mut Gateway, id: i64) -> Result<Self> {
		let value = gateway
			.invoke(ServiceName::Query, "find", json!({ "kind": ObjectKind::Image, "id": id }))
			.await?;
		Ok(Self { data: serde_json::from_value(value)? })
	}

	pub fn id(&self) -> i64 {
		self.data.id
	}

	pub fn name(&self) -> &str {
		&self.data.name
	}

	pub fn data(&self) -> &ImageData {
		&self.data
	}

	pub async fn annotations(&self, gateway: &mut Gateway) -> Result<Vec<AnnotationData>> {
		load_annotations(gateway, ObjectRef { kind: ObjectKind::Image, id: self.data.id }).await
	}
}

/// An annotation attached to a project, dataset, or image.
pub struct AnnotationWrapper {
	data: AnnotationData,
}

impl AnnotationWrapper {
	pub fn data(&self) -> &AnnotationData {
		&self.data
	}

	/// Creates an annotation and links it to `target`, owned by the
	/// gateway's own principal.
	pub async fn attach(
		gateway: &mut Gateway,
		target: ObjectRef,
		kind: AnnotationKind,
		namespace: Option<&str>,
		text: &str,
	) -> Result<Self> {
		let value = gateway
			.invoke_write(
				ServiceName::Update,
				"createAnnotation",
				json!({
					"target": target,
					"kind": kind,
					"namespace": namespace,
					"text": text,
				}),
			)
			.await?;
		Ok(Self { data: serde_json::from_value(value)? })
	}

	/// Creates an annotation owned by `owner` rather than the caller, by
	/// running the write through a short-lived session under a cloned
	/// identity. The temporary session is always closed, even on failure.
	pub async fn attach_as(
		gateway: &Gateway,
		owner: &str,
		target: ObjectRef,
		kind: AnnotationKind,
		namespace: Option<&str>,
		text: &str,
	) -> Result<Self> {
		let identity = gateway.identity().clone_for_owner(owner);
		let mut sudo = Gateway::new(identity, gateway.factory(), gateway.backoff());
		if !sudo.connect(None).await {
			return Err(sudo.last_error().cloned().unwrap_or(Error::NotConnected));
		}
		let result = Self::attach(&mut sudo, target, kind, namespace, text).await;
		sudo.disconnect(true).await;
		result
	}
}

async fn load_annotations(gateway: &mut Gateway, target: ObjectRef) -> Result<Vec<AnnotationData>> {
	let value = gateway
		.invoke(ServiceName::Metadata, "loadAnnotations", json!({ "target": target }))
		.await?;
	serde_json::from_value(value).map_err(Error::from)
}
