//! Snapshots of remote entities as the server serializes them.
//!
//! A snapshot may be partially loaded: collection fields are `None` until the
//! server has been asked for them, which the wrapper layer does on demand.

use serde::{Deserialize, Serialize};

/// A user record resolved through the admin service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
	pub id: i64,
	pub login: String,
	#[serde(default)]
	pub first_name: Option<String>,
	#[serde(default)]
	pub last_name: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
	pub id: i64,
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub owner_id: Option<i64>,
	/// Child dataset ids; `None` when the hierarchy has not been loaded.
	#[serde(default)]
	pub dataset_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetData {
	pub id: i64,
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub owner_id: Option<i64>,
	#[serde(default)]
	pub project_id: Option<i64>,
	#[serde(default)]
	pub image_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
	pub id: i64,
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub owner_id: Option<i64>,
	#[serde(default)]
	pub dataset_id: Option<i64>,
	#[serde(default)]
	pub pixels_id: Option<i64>,
	#[serde(default)]
	pub acquisition_date: Option<i64>,
}

/// Kinds of annotation the server models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationKind {
	Comment,
	Tag,
	File,
	MapPairs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationData {
	pub id: i64,
	pub kind: AnnotationKind,
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default)]
	pub owner_id: Option<i64>,
}

/// Target of an annotation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
	Project,
	Dataset,
	Image,
}

/// Reference to a remote entity by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
	pub kind: ObjectKind,
	pub id: i64,
}
