//! Typed views of the Kubernetes resources the data client consumes.
//!
//! The wire types come from `k8s-openapi`; this crate narrows them to the
//! fields the translator actually reads. Conversions are lossy on purpose:
//! anything the routing translation does not consume is dropped at the edge.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod endpoints;
pub mod ingress;
pub mod service;

pub use self::endpoints::{EndpointPort, EndpointSubset, Endpoints};
pub use self::ingress::{
    BackendPort, IngressBackend, IngressItem, IngressRule, Metadata, PathRule, PathType, Traffic,
};
pub use self::service::{Service, ServiceKind, ServicePort};
pub use k8s_openapi::api::core::v1::Secret;
pub use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
pub use kube::{
    api::{Api, ListParams, ObjectMeta},
    Client, Config,
};
