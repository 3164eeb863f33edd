use teleport_core::{ChainIdentityPort, DomainId, DomainInfo, GuidError};

/// Fixed chain id ↔ domain table with source → destination routes.
#[derive(Debug, Clone, Default)]
pub struct StaticChainIdentity {
    domains: Vec<DomainInfo>,
    routes: Vec<(DomainId, DomainId)>,
}

// (source, source chain, destination, destination chain, test domains)
const KNOWN_ROUTES: &[(&str, u64, &str, u64, bool)] = &[
    ("OPT-MAIN-A", 10, "ETH-MAIN-A", 1, false),
    ("ARB-ONE-A", 42161, "ETH-MAIN-A", 1, false),
    ("OPT-GOER-A", 420, "ETH-GOER-A", 5, true),
    ("ARB-GOER-A", 421613, "ETH-GOER-A", 5, true),
    ("KOVAN-SLAVE-OPTIMISM-1", 69, "KOVAN-MASTER-1", 42, true),
    ("RINKEBY-SLAVE-ARBITRUM-1", 421611, "RINKEBY-MASTER-1", 4, true),
];

impl StaticChainIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mainnet, Goerli and the legacy Kovan/Rinkeby test routes. Test domains
    /// require the initial allocation claim.
    pub fn known() -> Result<Self, GuidError> {
        let mut table = Self::new();
        for (source, source_chain, destination, destination_chain, test) in KNOWN_ROUTES {
            let source = DomainInfo {
                domain: DomainId::from_name(source)?,
                chain_id: *source_chain,
                requires_initial_allocation: *test,
            };
            let destination = DomainInfo {
                domain: DomainId::from_name(destination)?,
                chain_id: *destination_chain,
                requires_initial_allocation: *test,
            };
            table = table.with_route(source, destination);
        }
        Ok(table)
    }

    pub fn with_domain(mut self, info: DomainInfo) -> Self {
        if !self.domains.iter().any(|d| d.domain == info.domain) {
            self.domains.push(info);
        }
        self
    }

    pub fn with_route(self, source: DomainInfo, destination: DomainInfo) -> Self {
        let mut table = self.with_domain(source).with_domain(destination);
        table.routes.push((source.domain, destination.domain));
        table
    }

    pub fn domains(&self) -> &[DomainInfo] {
        &self.domains
    }
}

impl ChainIdentityPort for StaticChainIdentity {
    fn domain_for_chain(&self, chain_id: u64) -> Option<DomainInfo> {
        self.domains.iter().find(|d| d.chain_id == chain_id).copied()
    }

    fn chain_for_domain(&self, domain: DomainId) -> Option<DomainInfo> {
        self.domains.iter().find(|d| d.domain == domain).copied()
    }

    fn destination_for(&self, source: DomainId) -> Option<DomainInfo> {
        let (_, destination) = self.routes.iter().find(|(s, _)| *s == source)?;
        self.chain_for_domain(*destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_table_routes_l2_to_l1() {
        let table = StaticChainIdentity::known().expect("known table");
        let source = table.domain_for_chain(420).expect("optimism goerli");
        assert_eq!(source.domain.name(), "OPT-GOER-A");
        assert!(source.requires_initial_allocation);

        let destination = table.destination_for(source.domain).expect("route");
        assert_eq!(destination.chain_id, 5);
        assert_eq!(destination.domain.name(), "ETH-GOER-A");

        let kovan = table.domain_for_chain(69).expect("kovan optimism");
        assert_eq!(
            table.destination_for(kovan.domain).map(|d| d.chain_id),
            Some(42)
        );
    }

    #[test]
    fn mainnet_needs_no_allocation_and_has_no_outbound_route_from_l1() {
        let table = StaticChainIdentity::known().expect("known table");
        let l1 = table.domain_for_chain(1).expect("mainnet");
        assert!(!l1.requires_initial_allocation);
        assert!(table.destination_for(l1.domain).is_none());
        assert!(table.domain_for_chain(137).is_none());
    }
}
