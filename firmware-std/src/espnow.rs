//! ESP-NOW radio over a Wi-Fi station interface.
//!
//! Wi-Fi is started in STA mode without connecting; ESP-NOW rides on it.
//! Driver callbacks run in the Wi-Fi task and only forward into the shared
//! [`RadioContext`].

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo, SendStatus as EspSendStatus};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{
    esp, esp_wifi_set_channel, wifi_interface_t_WIFI_IF_STA,
    wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, EspError, ESP_ERR_ESPNOW_EXIST,
    ESP_ERR_ESPNOW_FULL, ESP_ERR_ESPNOW_NOT_INIT, ESP_ERR_INVALID_STATE,
};
use esp_idf_svc::wifi::{BlockingWifi, Configuration, EspWifi};

use gesturecam::peer::{MacAddress, Peer, RegistrationError};
use gesturecam::radio::{
    InitError, RadioContext, RadioTransport, SendError, SendStatus, MAX_PAYLOAD_LEN,
};

pub struct EspNowRadio {
    modem: Option<Modem>,
    sys_loop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
    ctx: &'static RadioContext,
    wifi: Option<BlockingWifi<EspWifi<'static>>>,
    espnow: Option<EspNow<'static>>,
}

impl EspNowRadio {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        ctx: &'static RadioContext,
    ) -> Self {
        Self {
            modem: Some(modem),
            sys_loop,
            nvs: Some(nvs),
            ctx,
            wifi: None,
            espnow: None,
        }
    }

    fn start_wifi(&mut self) -> Result<(), EspError> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| EspError::from_infallible::<ESP_ERR_INVALID_STATE>())?;
        let mut wifi = BlockingWifi::wrap(
            EspWifi::new(modem, self.sys_loop.clone(), self.nvs.take())?,
            self.sys_loop.clone(),
        )?;
        wifi.set_configuration(&Configuration::Client(Default::default()))?;
        wifi.start()?;
        self.wifi = Some(wifi);
        Ok(())
    }

    fn start_link(&mut self) -> Result<(), EspError> {
        let espnow = EspNow::take()?;

        let ctx = self.ctx;
        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            ctx.on_receive(info.src_addr, data);
        })?;
        espnow.register_send_cb(move |dst: &[u8], status: EspSendStatus| {
            let Ok(dst) = MacAddress::try_from(dst) else {
                return;
            };
            let status = match status {
                EspSendStatus::SUCCESS => SendStatus::Success,
                EspSendStatus::FAIL => SendStatus::Fail,
            };
            ctx.on_send_complete(&dst, status);
        })?;

        self.espnow = Some(espnow);
        Ok(())
    }
}

impl RadioTransport for EspNowRadio {
    fn init(&mut self) -> Result<(), InitError> {
        self.start_wifi().map_err(|e| InitError::Wifi(e.code()))?;
        log::info!("Wi-Fi started in station mode");
        self.start_link().map_err(|e| InitError::Link(e.code()))?;
        log::info!("ESP-NOW initialized");
        Ok(())
    }

    fn add_peer(&mut self, peer: &Peer) -> Result<(), RegistrationError> {
        let espnow = self
            .espnow
            .as_ref()
            .ok_or(RegistrationError::Driver(ESP_ERR_ESPNOW_NOT_INIT as i32))?;

        // Channel 0 means "whatever the station is on".
        if peer.channel != 0 {
            esp!(unsafe {
                esp_wifi_set_channel(peer.channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE)
            })
            .map_err(|e| RegistrationError::Driver(e.code()))?;
        }

        let info = PeerInfo {
            peer_addr: peer.addr,
            channel: peer.channel,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt: false,
            ..Default::default()
        };
        espnow.add_peer(info).map_err(|e| match e.code() as u32 {
            ESP_ERR_ESPNOW_FULL => RegistrationError::TableFull,
            ESP_ERR_ESPNOW_EXIST => RegistrationError::AlreadyRegistered,
            _ => RegistrationError::Driver(e.code()),
        })
    }

    fn send(&mut self, dst: &MacAddress, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(SendError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let espnow = self.espnow.as_ref().ok_or(SendError::NotRegistered)?;
        espnow
            .send(*dst, payload)
            .map_err(|e| SendError::Driver(e.code()))
    }
}
