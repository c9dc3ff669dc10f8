//! kube-rs backed collaborators
//!
//! Production implementations of the traits in [`crate::session`]:
//! [`KubeObjects`] for get/update/watch, [`KubeExec`] for commands run
//! through the pod exec subresource, and [`KubeImages`] for builder image
//! metadata read from OpenShift image stream tags.

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use kube::api::{
    Api, ApiResource, AttachParams, DynamicObject, GroupVersionKind, PostParams, WatchEvent,
    WatchParams,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use stevedore_core::{BuilderMetadata, ImageRef};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{KubeError, Result};
use crate::resource::{Kinded, ResourceKind, ResourceRef, Selector};
use crate::session::{
    BuilderImages, ExecInput, ExecOutput, ObjectSession, ObservedEvent, RemoteExec, Rollouts,
    WatchSession,
};

/// Namespace holding the shared builder image streams
pub const DEFAULT_IMAGE_NAMESPACE: &str = "openshift";

/// [`ObjectSession`] over one kind through the Kubernetes API
#[derive(Clone)]
pub struct KubeObjects<K> {
    api: Api<K>,
    namespace: Option<String>,
}

impl<K> KubeObjects<K>
where
    K: kube::Resource,
    <K as kube::Resource>::DynamicType: Default,
{
    /// Session bound to `namespace`
    pub fn namespaced(client: Client, namespace: &str) -> Self
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: Some(namespace.to_string()),
        }
    }

    /// Session over a cluster-scoped kind
    pub fn cluster(client: Client) -> Self {
        Self {
            api: Api::all(client),
            namespace: None,
        }
    }
}

#[async_trait]
impl<K> ObjectSession<K> for KubeObjects<K>
where
    K: Kinded + kube::Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    async fn get(&self, name: &str) -> Result<K> {
        self.api
            .get(name)
            .await
            .map_err(|e| KubeError::from_api(&self.reference(name), e))
    }

    async fn update(&self, object: &K) -> Result<K> {
        let name = object.object_name();
        self.api
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| KubeError::from_api(&self.reference(name), e))
    }

    async fn watch(&self, selector: &Selector) -> Result<WatchSession<K>> {
        let resource = self.watch_reference(selector);

        let mut params = WatchParams::default();
        if let Some(fields) = &selector.fields {
            params = params.fields(fields);
        }
        if let Some(labels) = &selector.labels {
            params = params.labels(labels);
        }

        // "0" replays current state as synthetic Added events
        let stream = self
            .api
            .watch(&params, "0")
            .await
            .map_err(|e| KubeError::from_api(&resource, e))?;

        let events = stream
            .filter_map(|item| async move {
                match item {
                    Ok(WatchEvent::Added(o)) => Some(ObservedEvent::added(o)),
                    Ok(WatchEvent::Modified(o)) => Some(ObservedEvent::modified(o)),
                    Ok(WatchEvent::Deleted(o)) => Some(ObservedEvent::deleted(o)),
                    Ok(WatchEvent::Bookmark(_)) => None,
                    Ok(WatchEvent::Error(status)) => Some(ObservedEvent::error(status.message)),
                    Err(e) => Some(ObservedEvent::error(e.to_string())),
                }
            })
            .boxed();

        // dropping the stream ends the HTTP request
        Ok(WatchSession::new(resource, events, || {}))
    }
}

#[async_trait]
impl Rollouts for KubeObjects<Deployment> {
    async fn trigger_rollout(&self, name: &str) -> Result<()> {
        tracing::debug!(deployment = name, "triggering rollout");
        self.api
            .restart(name)
            .await
            .map_err(|e| KubeError::from_api(&self.reference(name), e))?;
        Ok(())
    }
}

/// [`RemoteExec`] through the pod exec subresource
#[derive(Clone)]
pub struct KubeExec {
    api: Api<Pod>,
}

impl KubeExec {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl RemoteExec for KubeExec {
    async fn exec(
        &self,
        pod: &str,
        command: &[String],
        stdin: Option<ExecInput>,
    ) -> Result<ExecOutput> {
        let failed = |message: String| KubeError::Exec {
            pod: pod.to_string(),
            command: command.to_vec(),
            message,
        };

        let params = AttachParams::default()
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        tracing::debug!(pod, ?command, "exec");
        let mut attached = self
            .api
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let remote_stdin = attached.stdin();
        let remote_stdout = attached.stdout();
        let remote_stderr = attached.stderr();

        let feed = async move {
            match (stdin, remote_stdin) {
                (Some(mut input), Some(mut writer)) => {
                    tokio::io::copy(&mut input, &mut writer).await?;
                    writer.shutdown().await
                }
                _ => Ok(()),
            }
        };
        let collect_stdout = async move {
            let mut out = String::new();
            if let Some(mut reader) = remote_stdout {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, std::io::Error>(out)
        };
        let collect_stderr = async move {
            let mut out = String::new();
            if let Some(mut reader) = remote_stderr {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, std::io::Error>(out)
        };

        let (fed, stdout, stderr) = tokio::join!(feed, collect_stdout, collect_stderr);

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached.join().await.map_err(|e| failed(e.to_string()))?;

        if let Some(status) = status
            && status.status.as_deref() != Some("Success")
        {
            return Err(failed(
                status
                    .message
                    .unwrap_or_else(|| "command exited with failure".to_string()),
            ));
        }

        fed.map_err(|e| KubeError::Stream(e.to_string()))?;
        Ok(ExecOutput {
            stdout: stdout.map_err(|e| KubeError::Stream(e.to_string()))?,
            stderr: stderr.map_err(|e| KubeError::Stream(e.to_string()))?,
        })
    }
}

/// [`BuilderImages`] reading `ImageStreamTag` objects
#[derive(Clone)]
pub struct KubeImages {
    client: Client,
    resource: ApiResource,
}

impl KubeImages {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("image.openshift.io", "v1", "ImageStreamTag");
        Self {
            client,
            resource: ApiResource::from_gvk_with_plural(&gvk, "imagestreamtags"),
        }
    }
}

#[async_trait]
impl BuilderImages for KubeImages {
    async fn metadata(&self, image: &ImageRef) -> Result<BuilderMetadata> {
        let namespace = image.namespace.as_deref().unwrap_or(DEFAULT_IMAGE_NAMESPACE);
        let name = image.lookup_name();
        let reference = ResourceRef::namespaced(ResourceKind::ImageStreamTag, namespace, &name);

        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.resource);
        let tag = api
            .get(&name)
            .await
            .map_err(|e| KubeError::from_api(&reference, e))?;

        tracing::debug!(image = %image, "read builder image metadata");
        Ok(metadata_from_tag(&tag.data))
    }
}

/// Labels and working directory from an image stream tag body
///
/// `ContainerConfig` wins over `Config`; missing sections yield empty metadata.
pub fn metadata_from_tag(tag: &Value) -> BuilderMetadata {
    let docker = &tag["image"]["dockerImageMetadata"];
    let config = ["ContainerConfig", "Config"]
        .iter()
        .map(|section| &docker[section])
        .find(|c| c.get("Labels").is_some_and(|l| !l.is_null()) || c.get("WorkingDir").is_some());

    let labels: BTreeMap<String, String> = config
        .and_then(|c| c.get("Labels"))
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let working_dir = config
        .and_then(|c| c.get("WorkingDir"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    BuilderMetadata::new(labels, working_dir)
}
