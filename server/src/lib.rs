//! klangwerk-server – Bibliotheks-Root
//!
//! Verdrahtet Kataloge, Sitzungsregistry, Befehlsausfuehrung und den
//! Multiplexer. Integrationstests starten den Server ueber [`Server::laufen`]
//! mit eigenem Listener und eigener Konsoleneingabe.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::ServerConfig;
use klangwerk_catalog::{PlaylistStore, SongCatalog, UserStore};
use klangwerk_commander::{OperatorConsole, RequestExecutor};
use klangwerk_streaming::{ConnectionMultiplexer, StreamingSessionRegistry, SymphoniaOpener};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Geladene Speicher und verdrahtete Dienste
pub struct Dienste {
    pub katalog: Arc<SongCatalog>,
    pub benutzer: Arc<UserStore>,
    pub playlists: Arc<PlaylistStore>,
    pub registry: StreamingSessionRegistry,
    pub multiplexer: ConnectionMultiplexer,
    pub konsole: OperatorConsole,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Laedt Songs, Benutzer und Playlists und baut die Dienste auf
    pub fn dienste_aufbauen(&self) -> Result<Dienste> {
        let k = &self.config.katalog;

        let katalog = Arc::new(
            SongCatalog::laden(&k.songs_datei)
                .with_context(|| format!("Songkatalog {} nicht ladbar", k.songs_datei.display()))?,
        );
        let benutzer = Arc::new(
            UserStore::laden(&k.benutzer_datei, self.config.passwort_parameter()).with_context(
                || format!("Benutzerdatei {} nicht ladbar", k.benutzer_datei.display()),
            )?,
        );
        let playlists = Arc::new(
            PlaylistStore::laden(&k.playlist_verzeichnis, &katalog).with_context(|| {
                format!(
                    "Playlists aus {} nicht ladbar",
                    k.playlist_verzeichnis.display()
                )
            })?,
        );

        let registry = StreamingSessionRegistry::neu(
            Arc::clone(&katalog),
            Arc::new(SymphoniaOpener),
            self.config.streaming.fragment_groesse,
        );
        let executor = RequestExecutor::neu(
            Arc::clone(&katalog),
            Arc::clone(&benutzer),
            Arc::clone(&playlists),
            registry.clone(),
        );
        let multiplexer =
            ConnectionMultiplexer::neu(registry.clone(), executor, self.config.multiplexer_config());
        let konsole = OperatorConsole::neu(Arc::clone(&katalog), registry.clone(), &k.songs_datei);

        Ok(Dienste {
            katalog,
            benutzer,
            playlists,
            registry,
            multiplexer,
            konsole,
        })
    }

    /// Startet den Server auf der konfigurierten Adresse und laeuft bis zum Shutdown
    ///
    /// Shutdown kommt von `quit` auf der Konsole oder von Ctrl-C.
    pub async fn starten(self) -> Result<()> {
        let adresse = self.config.bind_adresse();
        let listener = TcpListener::bind(&adresse)
            .await
            .with_context(|| format!("Bind auf {adresse} fehlgeschlagen"))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctrl_c_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = ctrl_c_tx.send(true);
            }
        });

        let konsole = self
            .config
            .server
            .konsole
            .then(|| BufReader::new(tokio::io::stdin()));
        self.laufen(listener, konsole, shutdown_tx, shutdown_rx).await
    }

    /// Betreibt den Server auf einem gebundenen Listener
    ///
    /// Mit `konsole` liest ein eigener Task Operator-Befehle. Nach dem
    /// Shutdown werden alle Wiedergaben geschlossen und der Katalog
    /// (inklusive Stream-Zaehler) gespeichert.
    pub async fn laufen<R>(
        self,
        listener: TcpListener,
        konsole: Option<R>,
        shutdown_tx: watch::Sender<bool>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let dienste = self.dienste_aufbauen()?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %listener.local_addr()?,
            songs = dienste.katalog.anzahl(),
            benutzer = dienste.benutzer.anzahl(),
            playlists = dienste.playlists.namen().len(),
            "Server startet"
        );

        let konsolen_task = konsole.map(|eingabe| {
            let konsole = dienste.konsole;
            let shutdown_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = konsole
                    .ausfuehren(eingabe, tokio::io::stdout(), shutdown_tx)
                    .await
                {
                    tracing::error!(fehler = %e, "Operator-Konsole beendet");
                }
            })
        });

        dienste.multiplexer.starten(listener, shutdown_rx).await?;

        if let Some(task) = konsolen_task {
            task.abort();
        }
        let geschlossen = dienste.registry.alle_streams_schliessen();
        dienste
            .katalog
            .speichern(&self.config.katalog.songs_datei)
            .context("Songkatalog konnte nicht gespeichert werden")?;

        tracing::info!(wiedergaben = geschlossen, "Server beendet");
        Ok(())
    }
}
