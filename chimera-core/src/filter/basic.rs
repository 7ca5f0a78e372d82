//! Basic-mode shadow filter: a tree of protocol-layer sub-filters.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use chimera_transport::{Command, CommandToken, Transport, Value};

use crate::error::CoreError;
use super::{FilterUse, MatchAction};

/// A `{use, value, mask}` field matcher generic over the value's wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch<T> {
    pub use_: bool,
    pub value: T,
    pub mask: String,
}

impl<T: Default> FieldMatch<T> {
    pub fn off(mask_width_hex_chars: usize) -> Self {
        FieldMatch { use_: false, value: T::default(), mask: "f".repeat(mask_width_hex_chars) }
    }
}

pub type MacMatch = FieldMatch<String>;
pub type TagMatch = FieldMatch<u32>;
pub type PortMatch = FieldMatch<u16>;
pub type DscpMatch = FieldMatch<u8>;
pub type Ipv4Match = FieldMatch<Ipv4Addr>;
pub type Ipv6Match = FieldMatch<Ipv6Addr>;

fn match_to_value(use_: bool, value: Value, mask: &str) -> Value {
    Value::List(vec![Value::Bool(use_), value, Value::Hex(mask.to_owned())])
}

fn value_to_match_parts(v: &Value) -> Result<(bool, &Value, &str), CoreError> {
    let fields = v.as_list().ok_or_else(|| CoreError::Config("expected a field-match record".into()))?;
    match fields {
        [use_, value, mask] => {
            let use_ = use_.as_bool().ok_or_else(|| CoreError::Config("bad use".into()))?;
            let mask = mask.as_hex().ok_or_else(|| CoreError::Config("bad mask".into()))?;
            Ok((use_, value, mask))
        }
        _ => Err(CoreError::Config("field-match record must have 3 entries".into())),
    }
}

/// Ethernet `{srcAddr, destAddr}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFilter {
    pub filter_use: FilterUse,
    pub match_action: MatchAction,
    pub src_addr: MacMatch,
    pub dest_addr: MacMatch,
}

impl EthernetFilter {
    pub fn off() -> Self {
        EthernetFilter {
            filter_use: FilterUse::Off,
            match_action: MatchAction::Include,
            src_addr: MacMatch::off(12),
            dest_addr: MacMatch::off(12),
        }
    }
}

/// VLAN sub-filter: `{tagInner, pcpInner, tagOuter, pcpOuter}`. Shared by the VLAN1/VLAN2
/// presence variants; the device distinguishes one vs. two tags via `Layer2Plus::present`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanFilter {
    pub filter_use: FilterUse,
    pub match_action: MatchAction,
    pub tag_inner: TagMatch,
    pub pcp_inner: TagMatch,
    pub tag_outer: TagMatch,
    pub pcp_outer: TagMatch,
}

impl VlanFilter {
    pub fn off() -> Self {
        VlanFilter {
            filter_use: FilterUse::Off,
            match_action: MatchAction::Include,
            tag_inner: TagMatch::off(3),
            pcp_inner: TagMatch::off(1),
            tag_outer: TagMatch::off(3),
            pcp_outer: TagMatch::off(1),
        }
    }
}

/// MPLS sub-filter: `{label, toc}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MplsFilter {
    pub filter_use: FilterUse,
    pub match_action: MatchAction,
    pub label: TagMatch,
    pub toc: TagMatch,
}

impl MplsFilter {
    pub fn off() -> Self {
        MplsFilter {
            filter_use: FilterUse::Off,
            match_action: MatchAction::Include,
            label: TagMatch::off(5),
            toc: TagMatch::off(1),
        }
    }
}

/// Which Layer 2+ protocol is present, if any: `None | VLAN1 | VLAN2 | MPLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer2PlusPresent {
    None,
    Vlan1,
    Vlan2,
    Mpls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer2Plus {
    pub present: Layer2PlusPresent,
    pub vlan: VlanFilter,
    pub mpls: MplsFilter,
}

impl Layer2Plus {
    pub fn none() -> Self {
        Layer2Plus { present: Layer2PlusPresent::None, vlan: VlanFilter::off(), mpls: MplsFilter::off() }
    }
}

/// IPv4 sub-filter: `{srcAddr, destAddr, dscp}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Filter {
    pub match_action: MatchAction,
    pub src_addr: Ipv4Match,
    pub dest_addr: Ipv4Match,
    pub dscp: DscpMatch,
}

impl Ipv4Filter {
    pub fn off() -> Self {
        Ipv4Filter {
            match_action: MatchAction::Include,
            src_addr: Ipv4Match::off(8),
            dest_addr: Ipv4Match::off(8),
            dscp: DscpMatch::off(2),
        }
    }
}

/// IPv6 sub-filter: `{srcAddr, destAddr}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Filter {
    pub match_action: MatchAction,
    pub src_addr: Ipv6Match,
    pub dest_addr: Ipv6Match,
}

impl Ipv6Filter {
    pub fn off() -> Self {
        Ipv6Filter { match_action: MatchAction::Include, src_addr: Ipv6Match::off(32), dest_addr: Ipv6Match::off(32) }
    }
}

/// Which Layer 3 protocol is present, if any: `None | IPv4 | IPv6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer3Present {
    None,
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer3 {
    pub present: Layer3Present,
    pub ipv4: Ipv4Filter,
    pub ipv6: Ipv6Filter,
}

impl Layer3 {
    pub fn none() -> Self {
        Layer3 { present: Layer3Present::None, ipv4: Ipv4Filter::off(), ipv6: Ipv6Filter::off() }
    }
}

/// TCP/UDP sub-filter: `{srcPort, destPort}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFilter {
    pub filter_use: FilterUse,
    pub match_action: MatchAction,
    pub src_port: PortMatch,
    pub dest_port: PortMatch,
}

impl PortFilter {
    pub fn off() -> Self {
        PortFilter {
            filter_use: FilterUse::Off,
            match_action: MatchAction::Include,
            src_port: PortMatch::off(4),
            dest_port: PortMatch::off(4),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer4 {
    pub tcp: PortFilter,
    pub udp: PortFilter,
}

impl Layer4 {
    pub fn none() -> Self {
        Layer4 { tcp: PortFilter::off(), udp: PortFilter::off() }
    }
}

/// One of the 16 TPLD entries: `{index, tpldId, use}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpldEntry {
    pub index: u8,
    pub tpld_id: u32,
    pub use_: bool,
}

pub const TPLD_ENTRY_COUNT: usize = 16;

/// TPLD sub-filter; carries only `matchAction` at the sub-filter level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpldFilter {
    pub match_action: MatchAction,
    pub entries: [TpldEntry; TPLD_ENTRY_COUNT],
}

impl TpldFilter {
    pub fn off() -> Self {
        let mut entries = [TpldEntry { index: 0, tpld_id: 0, use_: false }; TPLD_ENTRY_COUNT];
        for (i, e) in entries.iter_mut().enumerate() {
            e.index = i as u8;
        }
        TpldFilter { match_action: MatchAction::Include, entries }
    }
}

/// Arbitrary-byte matcher: `{position, value, mask}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyFieldFilter {
    pub filter_use: FilterUse,
    pub match_action: MatchAction,
    pub position: u32,
    pub value: String,
    pub mask: String,
}

impl AnyFieldFilter {
    pub fn off() -> Self {
        AnyFieldFilter {
            filter_use: FilterUse::Off,
            match_action: MatchAction::Include,
            position: 0,
            value: "0".repeat(12),
            mask: "f".repeat(12),
        }
    }
}

/// The full basic-mode filter tree for one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowFilterConfigBasic {
    pub ethernet: EthernetFilter,
    pub layer_2_plus: Layer2Plus,
    pub layer_3: Layer3,
    pub layer_4: Layer4,
    pub tpld: TpldFilter,
    pub any_field: AnyFieldFilter,
}

impl ShadowFilterConfigBasic {
    pub fn match_all() -> Self {
        ShadowFilterConfigBasic {
            ethernet: EthernetFilter::off(),
            layer_2_plus: Layer2Plus::none(),
            layer_3: Layer3::none(),
            layer_4: Layer4::none(),
            tpld: TpldFilter::off(),
            any_field: AnyFieldFilter::off(),
        }
    }
}

/// Drives the basic-mode sub-filter tree over the transport for one flow's shadow filter.
pub struct BasicModeConfigurator {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl BasicModeConfigurator {
    pub(crate) fn new(transport: Arc<dyn Transport>, shadow_filter_base_path: String) -> Self {
        BasicModeConfigurator { transport, base_path: format!("{shadow_filter_base_path}/basic") }
    }

    /// Issue ~30 parallel reads to reconstruct every sub-filter, field matcher, and all 16 TPLD
    /// entries.
    pub async fn get(&self) -> Result<ShadowFilterConfigBasic, CoreError> {
        macro_rules! spawn_get {
            ($path:expr) => {{
                let transport = Arc::clone(&self.transport);
                let path = $path;
                tokio::spawn(async move { transport.execute(Command::Get(path)).await })
            }};
        }

        let eth = spawn_get!(format!("{}/ethernet/settings", self.base_path));
        let eth_src = spawn_get!(format!("{}/ethernet/src_addr", self.base_path));
        let eth_dst = spawn_get!(format!("{}/ethernet/dest_addr", self.base_path));

        let l2plus_use = spawn_get!(format!("{}/l2plus/use", self.base_path));
        let vlan = spawn_get!(format!("{}/vlan/settings", self.base_path));
        let vlan_tag_in = spawn_get!(format!("{}/vlan/tag_inner", self.base_path));
        let vlan_pcp_in = spawn_get!(format!("{}/vlan/pcp_inner", self.base_path));
        let vlan_tag_out = spawn_get!(format!("{}/vlan/tag_outer", self.base_path));
        let vlan_pcp_out = spawn_get!(format!("{}/vlan/pcp_outer", self.base_path));
        let mpls = spawn_get!(format!("{}/mpls/settings", self.base_path));
        let mpls_label = spawn_get!(format!("{}/mpls/label", self.base_path));
        let mpls_toc = spawn_get!(format!("{}/mpls/toc", self.base_path));

        let l3_use = spawn_get!(format!("{}/l3/use", self.base_path));
        let ipv4 = spawn_get!(format!("{}/ipv4/settings", self.base_path));
        let ipv4_src = spawn_get!(format!("{}/ipv4/src_addr", self.base_path));
        let ipv4_dst = spawn_get!(format!("{}/ipv4/dest_addr", self.base_path));
        let ipv4_dscp = spawn_get!(format!("{}/ipv4/dscp", self.base_path));
        let ipv6 = spawn_get!(format!("{}/ipv6/settings", self.base_path));
        let ipv6_src = spawn_get!(format!("{}/ipv6/src_addr", self.base_path));
        let ipv6_dst = spawn_get!(format!("{}/ipv6/dest_addr", self.base_path));

        let tcp = spawn_get!(format!("{}/tcp/settings", self.base_path));
        let tcp_src = spawn_get!(format!("{}/tcp/src_port", self.base_path));
        let tcp_dst = spawn_get!(format!("{}/tcp/dest_port", self.base_path));
        let udp = spawn_get!(format!("{}/udp/settings", self.base_path));
        let udp_src = spawn_get!(format!("{}/udp/src_port", self.base_path));
        let udp_dst = spawn_get!(format!("{}/udp/dest_port", self.base_path));

        let tpld_settings = spawn_get!(format!("{}/tpld/settings", self.base_path));
        let tpld_entries: Vec<_> =
            (0..TPLD_ENTRY_COUNT).map(|i| spawn_get!(format!("{}/tpld/entry/{i}", self.base_path))).collect();

        let any_settings = spawn_get!(format!("{}/any/settings", self.base_path));
        let any_config = spawn_get!(format!("{}/any/config", self.base_path));

        async fn join(h: tokio::task::JoinHandle<Result<Value, chimera_transport::TransportError>>) -> Result<Value, CoreError> {
            Ok(h.await.expect("basic-mode read task panicked")?)
        }

        let (eth_use, eth_action) = parse_use_action(&join(eth).await?)?;
        let ethernet = EthernetFilter {
            filter_use: eth_use,
            match_action: eth_action,
            src_addr: parse_mac_match(&join(eth_src).await?)?,
            dest_addr: parse_mac_match(&join(eth_dst).await?)?,
        };

        let (vlan_use, vlan_action) = parse_use_action(&join(vlan).await?)?;
        let vlan_filter = VlanFilter {
            filter_use: vlan_use,
            match_action: vlan_action,
            tag_inner: parse_tag_match(&join(vlan_tag_in).await?)?,
            pcp_inner: parse_tag_match(&join(vlan_pcp_in).await?)?,
            tag_outer: parse_tag_match(&join(vlan_tag_out).await?)?,
            pcp_outer: parse_tag_match(&join(vlan_pcp_out).await?)?,
        };
        let (mpls_use, mpls_action) = parse_use_action(&join(mpls).await?)?;
        let mpls_filter = MplsFilter {
            filter_use: mpls_use,
            match_action: mpls_action,
            label: parse_tag_match(&join(mpls_label).await?)?,
            toc: parse_tag_match(&join(mpls_toc).await?)?,
        };
        let present = match join(l2plus_use).await?.as_str() {
            Some("none") => Layer2PlusPresent::None,
            Some("vlan1") => Layer2PlusPresent::Vlan1,
            Some("vlan2") => Layer2PlusPresent::Vlan2,
            Some("mpls") => Layer2PlusPresent::Mpls,
            _ => return Err(CoreError::Config("malformed l2plus presence".into())),
        };
        let layer_2_plus = Layer2Plus { present, vlan: vlan_filter, mpls: mpls_filter };

        let ipv4_action = parse_bool_action(&join(ipv4).await?)?;
        let ipv4_filter = Ipv4Filter {
            match_action: ipv4_action,
            src_addr: parse_ipv4_match(&join(ipv4_src).await?)?,
            dest_addr: parse_ipv4_match(&join(ipv4_dst).await?)?,
            dscp: parse_dscp_match(&join(ipv4_dscp).await?)?,
        };
        let ipv6_action = parse_bool_action(&join(ipv6).await?)?;
        let ipv6_filter = Ipv6Filter {
            match_action: ipv6_action,
            src_addr: parse_ipv6_match(&join(ipv6_src).await?)?,
            dest_addr: parse_ipv6_match(&join(ipv6_dst).await?)?,
        };
        let present = match join(l3_use).await?.as_str() {
            Some("none") => Layer3Present::None,
            Some("ipv4") => Layer3Present::Ipv4,
            Some("ipv6") => Layer3Present::Ipv6,
            _ => return Err(CoreError::Config("malformed l3 presence".into())),
        };
        let layer_3 = Layer3 { present, ipv4: ipv4_filter, ipv6: ipv6_filter };

        let (tcp_use, tcp_action) = parse_use_action(&join(tcp).await?)?;
        let tcp_filter = PortFilter {
            filter_use: tcp_use,
            match_action: tcp_action,
            src_port: parse_port_match(&join(tcp_src).await?)?,
            dest_port: parse_port_match(&join(tcp_dst).await?)?,
        };
        let (udp_use, udp_action) = parse_use_action(&join(udp).await?)?;
        let udp_filter = PortFilter {
            filter_use: udp_use,
            match_action: udp_action,
            src_port: parse_port_match(&join(udp_src).await?)?,
            dest_port: parse_port_match(&join(udp_dst).await?)?,
        };
        let layer_4 = Layer4 { tcp: tcp_filter, udp: udp_filter };

        let (_, tpld_action) = parse_use_action(&join(tpld_settings).await?)?;
        let mut entries = [TpldEntry { index: 0, tpld_id: 0, use_: false }; TPLD_ENTRY_COUNT];
        for (i, handle) in tpld_entries.into_iter().enumerate() {
            let v = join(handle).await?;
            let fields = v.as_list().ok_or_else(|| CoreError::Config("bad tpld entry".into()))?;
            let [use_, tpld_id] = fields else {
                return Err(CoreError::Config("tpld entry must have 2 fields".into()));
            };
            entries[i] = TpldEntry {
                index: i as u8,
                tpld_id: tpld_id.as_u32().ok_or_else(|| CoreError::Config("bad tpld id".into()))?,
                use_: use_.as_bool().ok_or_else(|| CoreError::Config("bad tpld use".into()))?,
            };
        }
        let tpld = TpldFilter { match_action: tpld_action, entries };

        let (any_use, any_action) = parse_use_action(&join(any_settings).await?)?;
        let any_cfg = join(any_config).await?;
        let any_fields = any_cfg.as_list().ok_or_else(|| CoreError::Config("bad any config".into()))?;
        let [position, value, mask] = any_fields else {
            return Err(CoreError::Config("any config must have 3 fields".into()));
        };
        let any_field = AnyFieldFilter {
            filter_use: any_use,
            match_action: any_action,
            position: position.as_u32().ok_or_else(|| CoreError::Config("bad any position".into()))?,
            value: value.as_hex().ok_or_else(|| CoreError::Config("bad any value".into()))?.to_owned(),
            mask: mask.as_hex().ok_or_else(|| CoreError::Config("bad any mask".into()))?.to_owned(),
        };

        Ok(ShadowFilterConfigBasic { ethernet, layer_2_plus, layer_3, layer_4, tpld, any_field })
    }

    /// Emit conditional command sequences: only sub-filters whose `filterUse ≠ Off` (so untouched
    /// layers keep whatever is in the working registers after `apply`). TPLD always emits action
    /// plus all 16 entries. Layer 4 writes TCP or UDP, never both — TCP wins if both are
    /// configured. All emitted commands are batched atomically.
    pub async fn set(&self, config: &ShadowFilterConfigBasic) -> Result<(), CoreError> {
        let mut tokens = Vec::new();
        self.emit_layer_2(config, &mut tokens);
        self.emit_layer_2_plus(config, &mut tokens);
        self.emit_layer_3(config, &mut tokens);
        self.emit_layer_4(config, &mut tokens);
        self.emit_layer_xena(config, &mut tokens);
        self.emit_layer_any(config, &mut tokens);
        self.transport.apply(tokens).await?;
        Ok(())
    }

    fn emit_layer_2(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        if config.ethernet.filter_use.is_off() {
            return;
        }
        out.push(CommandToken::set(
            "ethernet.settings",
            format!("{}/ethernet/settings", self.base_path),
            use_action_value(config.ethernet.filter_use, config.ethernet.match_action),
        ));
        out.push(CommandToken::set(
            "ethernet.src_addr",
            format!("{}/ethernet/src_addr", self.base_path),
            mac_match_value(&config.ethernet.src_addr),
        ));
        out.push(CommandToken::set(
            "ethernet.dest_addr",
            format!("{}/ethernet/dest_addr", self.base_path),
            mac_match_value(&config.ethernet.dest_addr),
        ));
    }

    fn emit_layer_2_plus(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        // Presence `None` overrides any partially-configured block beneath it: the presence
        // selector still gets written (so a prior VLAN/MPLS selection is cleared) but the
        // per-protocol fields are skipped.
        let present_str = match config.layer_2_plus.present {
            Layer2PlusPresent::None => "none",
            Layer2PlusPresent::Vlan1 => "vlan1",
            Layer2PlusPresent::Vlan2 => "vlan2",
            Layer2PlusPresent::Mpls => "mpls",
        };
        out.push(CommandToken::set(
            "l2plus.use",
            format!("{}/l2plus/use", self.base_path),
            Value::Str(present_str.into()),
        ));
        match config.layer_2_plus.present {
            Layer2PlusPresent::None => {}
            Layer2PlusPresent::Vlan1 | Layer2PlusPresent::Vlan2 => {
                let vlan = &config.layer_2_plus.vlan;
                out.push(CommandToken::set(
                    "vlan.settings",
                    format!("{}/vlan/settings", self.base_path),
                    use_action_value(vlan.filter_use, vlan.match_action),
                ));
                out.push(CommandToken::set(
                    "vlan.tag_inner",
                    format!("{}/vlan/tag_inner", self.base_path),
                    tag_match_value(&vlan.tag_inner),
                ));
                out.push(CommandToken::set(
                    "vlan.pcp_inner",
                    format!("{}/vlan/pcp_inner", self.base_path),
                    tag_match_value(&vlan.pcp_inner),
                ));
                out.push(CommandToken::set(
                    "vlan.tag_outer",
                    format!("{}/vlan/tag_outer", self.base_path),
                    tag_match_value(&vlan.tag_outer),
                ));
                out.push(CommandToken::set(
                    "vlan.pcp_outer",
                    format!("{}/vlan/pcp_outer", self.base_path),
                    tag_match_value(&vlan.pcp_outer),
                ));
            }
            Layer2PlusPresent::Mpls => {
                let mpls = &config.layer_2_plus.mpls;
                out.push(CommandToken::set(
                    "mpls.settings",
                    format!("{}/mpls/settings", self.base_path),
                    use_action_value(mpls.filter_use, mpls.match_action),
                ));
                out.push(CommandToken::set(
                    "mpls.label",
                    format!("{}/mpls/label", self.base_path),
                    tag_match_value(&mpls.label),
                ));
                out.push(CommandToken::set(
                    "mpls.toc",
                    format!("{}/mpls/toc", self.base_path),
                    tag_match_value(&mpls.toc),
                ));
            }
        }
    }

    fn emit_layer_3(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        let present_str = match config.layer_3.present {
            Layer3Present::None => "none",
            Layer3Present::Ipv4 => "ipv4",
            Layer3Present::Ipv6 => "ipv6",
        };
        out.push(CommandToken::set("l3.use", format!("{}/l3/use", self.base_path), Value::Str(present_str.into())));
        match config.layer_3.present {
            Layer3Present::None => {}
            Layer3Present::Ipv4 => {
                let ip = &config.layer_3.ipv4;
                out.push(CommandToken::set(
                    "ipv4.settings",
                    format!("{}/ipv4/settings", self.base_path),
                    Value::List(vec![Value::Bool(true), Value::Str(ip.match_action.as_str().into())]),
                ));
                out.push(CommandToken::set(
                    "ipv4.src_addr",
                    format!("{}/ipv4/src_addr", self.base_path),
                    match_to_value(ip.src_addr.use_, ipv4_hex(ip.src_addr.value), &ip.src_addr.mask),
                ));
                out.push(CommandToken::set(
                    "ipv4.dest_addr",
                    format!("{}/ipv4/dest_addr", self.base_path),
                    match_to_value(ip.dest_addr.use_, ipv4_hex(ip.dest_addr.value), &ip.dest_addr.mask),
                ));
                out.push(CommandToken::set(
                    "ipv4.dscp",
                    format!("{}/ipv4/dscp", self.base_path),
                    match_to_value(ip.dscp.use_, Value::U32(ip.dscp.value as u32), &ip.dscp.mask),
                ));
            }
            Layer3Present::Ipv6 => {
                let ip = &config.layer_3.ipv6;
                out.push(CommandToken::set(
                    "ipv6.settings",
                    format!("{}/ipv6/settings", self.base_path),
                    Value::List(vec![Value::Bool(true), Value::Str(ip.match_action.as_str().into())]),
                ));
                out.push(CommandToken::set(
                    "ipv6.src_addr",
                    format!("{}/ipv6/src_addr", self.base_path),
                    match_to_value(ip.src_addr.use_, ipv6_hex(ip.src_addr.value), &ip.src_addr.mask),
                ));
                out.push(CommandToken::set(
                    "ipv6.dest_addr",
                    format!("{}/ipv6/dest_addr", self.base_path),
                    match_to_value(ip.dest_addr.use_, ipv6_hex(ip.dest_addr.value), &ip.dest_addr.mask),
                ));
            }
        }
    }

    /// TCP and UDP are mutually exclusive in practice; write whichever has non-`Off` use. If
    /// both are non-`Off`, TCP wins.
    fn emit_layer_4(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        if !config.layer_4.tcp.filter_use.is_off() {
            let tcp = &config.layer_4.tcp;
            out.push(CommandToken::set(
                "tcp.settings",
                format!("{}/tcp/settings", self.base_path),
                use_action_value(tcp.filter_use, tcp.match_action),
            ));
            out.push(CommandToken::set(
                "tcp.src_port",
                format!("{}/tcp/src_port", self.base_path),
                port_match_value(&tcp.src_port),
            ));
            out.push(CommandToken::set(
                "tcp.dest_port",
                format!("{}/tcp/dest_port", self.base_path),
                port_match_value(&tcp.dest_port),
            ));
        } else if !config.layer_4.udp.filter_use.is_off() {
            let udp = &config.layer_4.udp;
            out.push(CommandToken::set(
                "udp.settings",
                format!("{}/udp/settings", self.base_path),
                use_action_value(udp.filter_use, udp.match_action),
            ));
            out.push(CommandToken::set(
                "udp.src_port",
                format!("{}/udp/src_port", self.base_path),
                port_match_value(&udp.src_port),
            ));
            out.push(CommandToken::set(
                "udp.dest_port",
                format!("{}/udp/dest_port", self.base_path),
                port_match_value(&udp.dest_port),
            ));
        }
    }

    fn emit_layer_xena(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        out.push(CommandToken::set(
            "tpld.settings",
            format!("{}/tpld/settings", self.base_path),
            Value::Str(config.tpld.match_action.as_str().into()),
        ));
        for entry in &config.tpld.entries {
            out.push(CommandToken::set(
                format!("tpld.entry.{}", entry.index),
                format!("{}/tpld/entry/{}", self.base_path, entry.index),
                Value::List(vec![Value::Bool(entry.use_), Value::U32(entry.tpld_id)]),
            ));
        }
    }

    fn emit_layer_any(&self, config: &ShadowFilterConfigBasic, out: &mut Vec<CommandToken>) {
        if config.any_field.filter_use.is_off() {
            return;
        }
        out.push(CommandToken::set(
            "any.settings",
            format!("{}/any/settings", self.base_path),
            use_action_value(config.any_field.filter_use, config.any_field.match_action),
        ));
        out.push(CommandToken::set(
            "any.config",
            format!("{}/any/config", self.base_path),
            Value::List(vec![
                Value::U32(config.any_field.position),
                Value::Hex(config.any_field.value.clone()),
                Value::Hex(config.any_field.mask.clone()),
            ]),
        ));
    }
}

fn use_action_value(filter_use: FilterUse, match_action: MatchAction) -> Value {
    Value::List(vec![Value::Str(filter_use.as_str().into()), Value::Str(match_action.as_str().into())])
}

fn parse_use_action(v: &Value) -> Result<(FilterUse, MatchAction), CoreError> {
    let fields = v.as_list().ok_or_else(|| CoreError::Config("expected a use/action record".into()))?;
    let [use_, action] = fields else {
        return Err(CoreError::Config("use/action record must have 2 fields".into()));
    };
    let filter_use = use_.as_str().and_then(FilterUse::parse).ok_or_else(|| CoreError::Config("bad filter_use".into()))?;
    let match_action =
        action.as_str().and_then(MatchAction::parse).ok_or_else(|| CoreError::Config("bad match_action".into()))?;
    Ok((filter_use, match_action))
}

/// The IPv4/IPv6 `settings` slot has no `filterUse` of its own (presence is selected one level
/// up, at `l3.use`); the first field is just a bool always written as `true`. Only the
/// `matchAction` is meaningful here.
fn parse_bool_action(v: &Value) -> Result<MatchAction, CoreError> {
    let fields = v.as_list().ok_or_else(|| CoreError::Config("expected a bool/action record".into()))?;
    let [_enabled, action] = fields else {
        return Err(CoreError::Config("bool/action record must have 2 fields".into()));
    };
    action.as_str().and_then(MatchAction::parse).ok_or_else(|| CoreError::Config("bad match_action".into()))
}

fn mac_match_value(m: &MacMatch) -> Value {
    match_to_value(m.use_, Value::Hex(m.value.clone()), &m.mask)
}

fn parse_mac_match(v: &Value) -> Result<MacMatch, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let value = value.as_hex().ok_or_else(|| CoreError::Config("bad mac value".into()))?.to_owned();
    Ok(MacMatch { use_, value, mask: mask.to_owned() })
}

fn tag_match_value(m: &TagMatch) -> Value {
    match_to_value(m.use_, Value::U32(m.value), &m.mask)
}

fn parse_tag_match(v: &Value) -> Result<TagMatch, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let value = value.as_u32().ok_or_else(|| CoreError::Config("bad tag value".into()))?;
    Ok(TagMatch { use_, value, mask: mask.to_owned() })
}

fn port_match_value(m: &PortMatch) -> Value {
    match_to_value(m.use_, Value::U32(m.value as u32), &m.mask)
}

fn parse_port_match(v: &Value) -> Result<PortMatch, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let value = value.as_u32().ok_or_else(|| CoreError::Config("bad port value".into()))? as u16;
    Ok(PortMatch { use_, value, mask: mask.to_owned() })
}

fn parse_dscp_match(v: &Value) -> Result<DscpMatch, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let value = value.as_u32().ok_or_else(|| CoreError::Config("bad dscp value".into()))? as u8;
    Ok(DscpMatch { use_, value, mask: mask.to_owned() })
}

fn parse_ipv4_match(v: &Value) -> Result<Ipv4Match, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let hex = value.as_hex().ok_or_else(|| CoreError::Config("bad ipv4 value".into()))?;
    let octets = u32::from_str_radix(hex, 16).map_err(|_| CoreError::Config("bad ipv4 hex".into()))?;
    Ok(Ipv4Match { use_, value: Ipv4Addr::from(octets), mask: mask.to_owned() })
}

fn parse_ipv6_match(v: &Value) -> Result<Ipv6Match, CoreError> {
    let (use_, value, mask) = value_to_match_parts(v)?;
    let hex = value.as_hex().ok_or_else(|| CoreError::Config("bad ipv6 value".into()))?;
    let bits = u128::from_str_radix(hex, 16).map_err(|_| CoreError::Config("bad ipv6 hex".into()))?;
    Ok(Ipv6Match { use_, value: Ipv6Addr::from(bits), mask: mask.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_transport::MockTransport;

    fn configurator(transport: Arc<MockTransport>) -> BasicModeConfigurator {
        BasicModeConfigurator::new(transport, "t/0/m/0/p/0/f/0/shadow_filter".into())
    }

    #[tokio::test]
    async fn layer_2_3_round_trip_when_others_stay_off() {
        let transport = Arc::new(MockTransport::new());
        let cfg = configurator(transport);
        let mut config = ShadowFilterConfigBasic::match_all();
        config.ethernet.filter_use = FilterUse::And;
        config.ethernet.match_action = MatchAction::Include;
        config.ethernet.src_addr = MacMatch { use_: true, value: "aaaaaaaaaaaa".into(), mask: "f".repeat(12) };
        config.layer_3.present = Layer3Present::Ipv4;
        config.layer_3.ipv4.match_action = MatchAction::Include;
        config.layer_3.ipv4.dest_addr =
            Ipv4Match { use_: true, value: Ipv4Addr::new(10, 0, 0, 2), mask: "ffffffff".into() };

        cfg.set(&config).await.unwrap();
        let read_back = cfg.get().await.unwrap();
        assert_eq!(read_back.ethernet.filter_use, FilterUse::And);
        assert_eq!(read_back.ethernet.src_addr.value, "aaaaaaaaaaaa");
        assert_eq!(read_back.layer_3.present, Layer3Present::Ipv4);
        assert_eq!(read_back.layer_3.ipv4.dest_addr.value, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(read_back.layer_2_plus.present, Layer2PlusPresent::None);
    }

    #[tokio::test]
    async fn layer_4_prefers_tcp_when_both_configured() {
        let transport = Arc::new(MockTransport::new());
        let cfg = configurator(transport);
        let mut config = ShadowFilterConfigBasic::match_all();
        config.layer_4.tcp.filter_use = FilterUse::And;
        config.layer_4.tcp.src_port = PortMatch { use_: true, value: 80, mask: "ffff".into() };
        config.layer_4.udp.filter_use = FilterUse::And;
        config.layer_4.udp.src_port = PortMatch { use_: true, value: 53, mask: "ffff".into() };

        cfg.set(&config).await.unwrap();
        let read_back = cfg.get().await.unwrap();
        assert_eq!(read_back.layer_4.tcp.filter_use, FilterUse::And);
        assert_eq!(read_back.layer_4.tcp.src_port.value, 80);
        // udp was never written because tcp took precedence
        assert_eq!(read_back.layer_4.udp.filter_use, FilterUse::Off);
    }

    #[tokio::test]
    async fn tpld_entries_always_all_written() {
        let transport = Arc::new(MockTransport::new());
        let cfg = configurator(transport);
        let mut config = ShadowFilterConfigBasic::match_all();
        config.tpld.entries[3] = TpldEntry { index: 3, tpld_id: 42, use_: true };
        cfg.set(&config).await.unwrap();
        let read_back = cfg.get().await.unwrap();
        assert_eq!(read_back.tpld.entries[3], TpldEntry { index: 3, tpld_id: 42, use_: true });
        assert_eq!(read_back.tpld.entries[0], TpldEntry { index: 0, tpld_id: 0, use_: false });
    }
}
