//! Advertising modes and the legacy advertising payload.
//!
//! Three ways to advertise:
//! - **Directed** at the most recent bond (fast reconnect, no payload,
//!   times out after ~1.28 s),
//! - **UndirectedFiltered**: connectable, but only the bonded host passes
//!   the accept list,
//! - **Undirected**: open to anyone, with name / appearance / service UUIDs
//!   so hosts can list the gamepad.

use crate::bonds::BondAddress;
use heapless::Vec;

/// Maximum legacy advertising payload length.
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Legacy advertising payload.
pub type AdvData = Vec<u8, MAX_ADV_DATA_LEN>;

/// HID over GATT service.
pub const HID_SERVICE_UUID: u16 = 0x1812;
/// Battery service.
pub const BATTERY_SERVICE_UUID: u16 = 0x180F;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
const AD_TYPE_NAME_SHORT: u8 = 0x08;
const AD_TYPE_NAME_COMPLETE: u8 = 0x09;
const AD_TYPE_APPEARANCE: u8 = 0x19;

/// LE General Discoverable | BR/EDR Not Supported.
const AD_FLAGS: u8 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    Directed,
    Undirected,
    UndirectedFiltered,
}

/// What the transport is asked to advertise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingParams {
    /// High-duty directed advertising to `peer`.
    Directed { peer: BondAddress },
    /// Connectable undirected advertising, accept list = `{peer}`.
    Filtered { peer: BondAddress },
    /// Connectable undirected advertising, no filter.
    Open,
}

impl AdvertisingParams {
    /// Pick the advertising flavour from the directed-retry flag and the
    /// most recent bond.
    pub fn select(try_directed: bool, bond: Option<BondAddress>) -> Self {
        match bond {
            Some(peer) if try_directed => AdvertisingParams::Directed { peer },
            Some(peer) => AdvertisingParams::Filtered { peer },
            None => AdvertisingParams::Open,
        }
    }

    pub fn mode(&self) -> AdvertisingMode {
        match self {
            AdvertisingParams::Directed { .. } => AdvertisingMode::Directed,
            AdvertisingParams::Filtered { .. } => AdvertisingMode::UndirectedFiltered,
            AdvertisingParams::Open => AdvertisingMode::Undirected,
        }
    }

    /// Target / accept-list entry, if any.
    pub fn peer(&self) -> Option<&BondAddress> {
        match self {
            AdvertisingParams::Directed { peer } | AdvertisingParams::Filtered { peer } => {
                Some(peer)
            }
            AdvertisingParams::Open => None,
        }
    }
}

/// Build the undirected advertising payload: flags, 16-bit service UUIDs,
/// appearance and the local name.
///
/// The name is shortened (AD type 0x08) to whatever room is left if it does
/// not fit completely.
pub fn advertising_data(name: &str, appearance: u16) -> AdvData {
    let mut data = AdvData::new();

    push_field(&mut data, AD_TYPE_FLAGS, &[AD_FLAGS]);

    let hid = HID_SERVICE_UUID.to_le_bytes();
    let bas = BATTERY_SERVICE_UUID.to_le_bytes();
    push_field(
        &mut data,
        AD_TYPE_UUID16_COMPLETE,
        &[hid[0], hid[1], bas[0], bas[1]],
    );

    push_field(&mut data, AD_TYPE_APPEARANCE, &appearance.to_le_bytes());

    let room = MAX_ADV_DATA_LEN.saturating_sub(data.len() + 2);
    if name.len() <= room {
        push_field(&mut data, AD_TYPE_NAME_COMPLETE, name.as_bytes());
    } else {
        let mut cut = room;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        push_field(&mut data, AD_TYPE_NAME_SHORT, &name.as_bytes()[..cut]);
    }

    data
}

fn push_field(data: &mut AdvData, ad_type: u8, payload: &[u8]) {
    if data.len() + 2 + payload.len() > MAX_ADV_DATA_LEN {
        warn!("Advertising field {} does not fit", ad_type);
        return;
    }
    let _ = data.push(payload.len() as u8 + 1);
    let _ = data.push(ad_type);
    let _ = data.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonds::AddressKind;
    use crate::config::{DEVICE_APPEARANCE, DEVICE_NAME};

    /// Find the payload of the first AD structure of `ad_type`.
    fn find_field(data: &[u8], ad_type: u8) -> Option<&[u8]> {
        let mut i = 0;
        while i < data.len() {
            let len = data[i] as usize;
            if len == 0 || i + len >= data.len() {
                break;
            }
            if data[i + 1] == ad_type {
                return Some(&data[i + 2..i + 1 + len]);
            }
            i += len + 1;
        }
        None
    }

    fn contains_uuid16(data: &[u8], uuid: u16) -> bool {
        find_field(data, AD_TYPE_UUID16_COMPLETE)
            .map(|uuids| uuids.chunks_exact(2).any(|c| c == uuid.to_le_bytes()))
            .unwrap_or(false)
    }

    const PEER: BondAddress = BondAddress::new(AddressKind::Public, [1, 2, 3, 4, 5, 6]);

    #[test]
    fn select_open_without_bond() {
        assert_eq!(AdvertisingParams::select(false, None), AdvertisingParams::Open);
        assert_eq!(AdvertisingParams::select(true, None), AdvertisingParams::Open);
    }

    #[test]
    fn select_filtered_with_bond() {
        let params = AdvertisingParams::select(false, Some(PEER));
        assert_eq!(params.mode(), AdvertisingMode::UndirectedFiltered);
        assert_eq!(params.peer(), Some(&PEER));
    }

    #[test]
    fn select_directed_only_when_requested_and_bonded() {
        let params = AdvertisingParams::select(true, Some(PEER));
        assert_eq!(params.mode(), AdvertisingMode::Directed);
        assert_eq!(params.peer(), Some(&PEER));
    }

    #[test]
    fn payload_fits_and_has_all_fields() {
        let data = advertising_data(DEVICE_NAME, DEVICE_APPEARANCE);
        assert!(data.len() <= MAX_ADV_DATA_LEN);
        assert_eq!(find_field(&data, AD_TYPE_FLAGS), Some(&[0x06][..]));
        assert!(contains_uuid16(&data, HID_SERVICE_UUID));
        assert!(contains_uuid16(&data, BATTERY_SERVICE_UUID));
        assert_eq!(
            find_field(&data, AD_TYPE_APPEARANCE),
            Some(&DEVICE_APPEARANCE.to_le_bytes()[..])
        );
        assert_eq!(
            find_field(&data, AD_TYPE_NAME_COMPLETE),
            Some(DEVICE_NAME.as_bytes())
        );
    }

    #[test]
    fn long_name_is_shortened() {
        let name = "A Very Long Gamepad Name That Cannot Fit";
        let data = advertising_data(name, DEVICE_APPEARANCE);
        assert_eq!(data.len(), MAX_ADV_DATA_LEN);
        assert!(find_field(&data, AD_TYPE_NAME_COMPLETE).is_none());
        let short = find_field(&data, AD_TYPE_NAME_SHORT).unwrap();
        assert!(name.as_bytes().starts_with(short));
        assert!(contains_uuid16(&data, HID_SERVICE_UUID));
    }

    #[test]
    fn shortened_name_keeps_utf8_intact() {
        let name = "ÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄÄ";
        let data = advertising_data(name, DEVICE_APPEARANCE);
        let short = find_field(&data, AD_TYPE_NAME_SHORT).unwrap();
        assert!(core::str::from_utf8(short).is_ok());
    }
}
