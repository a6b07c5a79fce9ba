use crate::SharedStore;
use ingress_controller_core::CertKind;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(SharedStore);

pub fn register(reg: &mut Registry, store: SharedStore) {
    reg.register_collector(Box::new(Instrumented(store)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let (mut tls, mut auth_only, mut incomplete) = (0u32, 0u32, 0u32);
        for record in self.0.read().iter() {
            match record.kind() {
                CertKind::Tls => {
                    tls += 1;
                    if record.full_chain_pem_path().is_none() {
                        incomplete += 1;
                    }
                }
                CertKind::AuthOnly => auth_only += 1,
            }
        }

        let mut size_encoder = encoder.encode_descriptor(
            "size",
            "The number of certificates in the store",
            None,
            MetricType::Gauge,
        )?;
        for (kind, count) in [("tls", tls), ("auth_only", auth_only)] {
            let labels = [("kind", kind)];
            ConstGauge::new(count).encode(size_encoder.encode_family(&labels)?)?;
        }

        let incomplete_encoder = encoder.encode_descriptor(
            "incomplete_chains",
            "The number of TLS certificates without a full intermediate chain",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(incomplete).encode(incomplete_encoder)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CertStore;
    use ingress_controller_core::{CertRecord, SecretId};
    use std::path::PathBuf;

    #[test]
    fn reports_store_size_by_kind() {
        let store = CertStore::shared();
        {
            let mut store = store.write();
            store.add(CertRecord::tls(
                SecretId::new("ns", "web-tls"),
                b"cert".to_vec(),
                b"key".to_vec(),
                None,
                "web".to_string(),
                PathBuf::from("/ssl/ns-web-tls.pem"),
            ));
            store.add(CertRecord::auth_only(
                SecretId::new("ns", "ca"),
                b"ca".to_vec(),
                "ca".to_string(),
                PathBuf::from("/ssl/ns-ca.pem"),
            ));
        }

        let mut prom = Registry::default();
        register(prom.sub_registry_with_prefix("cert_store"), store);
        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &prom).unwrap();

        assert!(text.contains("cert_store_size{kind=\"tls\"} 1"), "{text}");
        assert!(text.contains("cert_store_size{kind=\"auth_only\"} 1"), "{text}");
        assert!(text.contains("cert_store_incomplete_chains 1"), "{text}");
    }
}
