/// The bus types an MP table can describe, identified by a six character, space padded name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    CBus1,
    CBus2,
    Eisa,
    Future,
    Internal,
    Isa,
    Multibus1,
    Multibus2,
    Mca,
    Mpi,
    Mpsa,
    NuBus,
    Pci,
    Pcmcia,
    TurboChannel,
    VesaLocal,
    Vme,
    Xpress,
}

/// Every bus name defined by the MP specification.
static CATALOG: [(&[u8; 6], BusKind); 18] = [
    (b"CBUSI ", BusKind::CBus1),
    (b"CBUSII", BusKind::CBus2),
    (b"EISA  ", BusKind::Eisa),
    (b"FUTURE", BusKind::Future),
    (b"INTERN", BusKind::Internal),
    (b"ISA   ", BusKind::Isa),
    (b"MBI   ", BusKind::Multibus1),
    (b"MBII  ", BusKind::Multibus2),
    (b"MCA   ", BusKind::Mca),
    (b"MPI   ", BusKind::Mpi),
    (b"MPSA  ", BusKind::Mpsa),
    (b"NUBUS ", BusKind::NuBus),
    (b"PCI   ", BusKind::Pci),
    (b"PCMCIA", BusKind::Pcmcia),
    (b"TC    ", BusKind::TurboChannel),
    (b"VL    ", BusKind::VesaLocal),
    (b"VME   ", BusKind::Vme),
    (b"XPRESS", BusKind::Xpress),
];

impl BusKind {
    /// Resolve a bus name. The match is exact: case and padding must be the ones of the Intel
    /// MultiProcessor standard.
    #[must_use]
    pub fn from_name(name: &[u8; 6]) -> Option<Self> {
        CATALOG
            .iter()
            .find(|(known, _)| *known == name)
            .map(|&(_, kind)| kind)
    }

    /// The name of the bus type, as written in the table.
    #[must_use]
    pub fn name(self) -> &'static [u8; 6] {
        CATALOG
            .iter()
            .find(|&&(_, kind)| kind == self)
            .map_or(b"??????", |&(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert_eq!(BusKind::from_name(b"ISA   "), Some(BusKind::Isa));
        assert_eq!(BusKind::from_name(b"PCI   "), Some(BusKind::Pci));
        assert_eq!(BusKind::from_name(b"CBUSII"), Some(BusKind::CBus2));
    }

    #[test]
    fn match_is_case_and_padding_exact() {
        assert_eq!(BusKind::from_name(b"pci   "), None);
        assert_eq!(BusKind::from_name(b"PCI\0\0\0"), None);
        assert_eq!(BusKind::from_name(b" PCI  "), None);
    }

    #[test]
    fn names_round_trip_through_the_catalog() {
        for (name, kind) in &CATALOG {
            assert_eq!(kind.name(), *name);
        }
    }
}
