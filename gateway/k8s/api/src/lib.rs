#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
mod source;

pub use self::source::RoutingSource;
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            EndpointAddress, EndpointPort, EndpointSubset, Endpoints, ObjectReference, Service,
            ServicePort, ServiceSpec,
        },
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, ResourceExt},
    Client,
};
