use crate::Ingress;
use kube::ResourceExt;

pub const CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
pub const DEFAULT_CLASS: &str = "nginx";

/// Decides whether an ingress is served by this controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressClass(String);

impl IngressClass {
    pub fn new(class: impl ToString) -> Self {
        Self(class.to_string())
    }

    /// An ingress matches if its class annotation or `spec.ingressClassName` names our class.
    /// Unclassed ingresses are only claimed when running as the default class.
    pub fn is_valid(&self, ingress: &Ingress) -> bool {
        let class = ingress
            .annotations()
            .get(CLASS_ANNOTATION)
            .cloned()
            .or_else(|| {
                ingress
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.ingress_class_name.clone())
            })
            .filter(|c| !c.is_empty());

        match class {
            Some(class) => class == self.0,
            None => self.0 == DEFAULT_CLASS,
        }
    }
}

impl std::str::FromStr for IngressClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
