use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
use crate::ConsoleCommand;

/// Channel depth for module inboxes and the shared outbox.
const CHANNEL_CAPACITY: usize = 1000;

pub struct ModuleManager {
    modules: HashMap<ModuleId, Box<dyn AsyncModule>>,
    module_handles: HashMap<ModuleId, JoinHandle<()>>,
    module_senders: HashMap<ModuleId, mpsc::Sender<ModuleEvent>>,
    message_receiver: Option<mpsc::Receiver<ModuleMessage>>,
    message_sender: mpsc::Sender<ModuleMessage>,
    running: bool,
}

impl ModuleManager {
    pub fn new() -> Self {
        let (message_sender, message_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        Self {
            modules: HashMap::new(),
            module_handles: HashMap::new(),
            module_senders: HashMap::new(),
            message_receiver: Some(message_receiver),
            message_sender,
            running: false,
        }
    }

    /// Register a new module with the manager
    pub fn register_module(&mut self, module: Box<dyn AsyncModule>) {
        let id = module.id();
        self.modules.insert(id, module);
    }

    /// Initialize all registered modules
    pub async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for (id, module) in &mut self.modules {
            match module.initialize().await {
                Ok(_) => log::info!("Module {:?} initialized successfully", id),
                Err(e) => {
                    log::error!("Failed to initialize module {:?}: {}", id, e);
                    let error_message = format!("{:?} module error: {}", id, e);
                    return Err(error_message.into());
                }
            }
        }
        Ok(())
    }

    /// Start all modules in their own tasks
    ///
    /// Each task runs the module's main loop and then its shutdown hook.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.running {
            return Err("Module manager is already running".into());
        }

        let modules_to_start = std::mem::take(&mut self.modules);

        for (id, mut module) in modules_to_start {
            let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
            let message_tx = self.message_sender.clone();
            let module_id = id.clone();

            let handle = tokio::spawn(async move {
                if let Err(e) = module.run(event_rx, message_tx.clone()).await {
                    let _ = message_tx
                        .send(ModuleMessage::Error(format!(
                            "Module {:?} error: {}",
                            module_id, e
                        )))
                        .await;
                }
                if let Err(e) = module.shutdown().await {
                    log::error!("Module {:?} shutdown hook failed: {}", module_id, e);
                }
            });

            self.module_handles.insert(id.clone(), handle);
            self.module_senders.insert(id, event_tx);
        }

        self.running = true;
        Ok(())
    }

    /// Send an event to a specific module
    pub async fn send_to_module(
        &self,
        module_id: ModuleId,
        event: ModuleEvent,
    ) -> Result<(), String> {
        if let Some(sender) = self.module_senders.get(&module_id) {
            sender
                .send(event)
                .await
                .map_err(|e| format!("Failed to send event to module {:?}: {}", module_id, e))?;
            Ok(())
        } else {
            Err(format!("Module {:?} not found", module_id))
        }
    }

    /// Route a console command to the module that owns it
    pub async fn send_command(&self, command: ConsoleCommand) -> Result<(), String> {
        let target = Self::route(&command);
        self.send_to_module(target, ModuleEvent::Command(command))
            .await
    }

    fn route(command: &ConsoleCommand) -> ModuleId {
        match command {
            ConsoleCommand::VoiceStartRecording
            | ConsoleCommand::VoiceStopRecording
            | ConsoleCommand::VoicePlay
            | ConsoleCommand::VoiceStop
            | ConsoleCommand::VoiceLoadFile { .. }
            | ConsoleCommand::VoiceSelectPreset { .. }
            | ConsoleCommand::VoiceSetLoop { .. }
            | ConsoleCommand::VoiceSetGain { .. } => ModuleId::Voice,
            _ => ModuleId::Dj,
        }
    }

    /// Broadcast an event to all modules
    pub async fn broadcast_event(&self, event: ModuleEvent) {
        for (id, sender) in &self.module_senders {
            if let Err(e) = sender.send(event.clone()).await {
                log::warn!("Failed to broadcast event to module {:?}: {}", id, e);
            }
        }
    }

    /// Get the message receiver (should only be called once)
    pub fn take_message_receiver(&mut self) -> Option<mpsc::Receiver<ModuleMessage>> {
        self.message_receiver.take()
    }

    /// Shutdown all modules gracefully
    pub async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.running {
            return Ok(());
        }

        log::info!("Shutting down module manager...");

        // Send shutdown event to all modules
        self.broadcast_event(ModuleEvent::Shutdown).await;

        // Wait for all module handles to complete
        for (id, handle) in std::mem::take(&mut self.module_handles) {
            log::info!("Waiting for module {:?} to shutdown...", id);
            if let Err(e) = handle.await {
                log::error!("Module {:?} shutdown error: {}", id, e);
            }
        }

        self.module_senders.clear();

        self.running = false;
        log::info!("Module manager shutdown complete");
        Ok(())
    }

    /// Check if the manager is running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get status of modules that have not been started yet
    pub fn get_status(&self) -> HashMap<ModuleId, HashMap<String, String>> {
        let mut status = HashMap::new();
        for (id, module) in &self.modules {
            status.insert(id.clone(), module.status());
        }
        status
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// Echoes every command back as a status message.
    struct EchoModule {
        id: ModuleId,
    }

    #[async_trait]
    impl AsyncModule for EchoModule {
        fn id(&self) -> ModuleId {
            self.id.clone()
        }

        async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        async fn run(
            &mut self,
            mut rx: mpsc::Receiver<ModuleEvent>,
            tx: mpsc::Sender<ModuleMessage>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            while let Some(event) = rx.recv().await {
                match event {
                    ModuleEvent::Shutdown => break,
                    ModuleEvent::Command(cmd) => {
                        let _ = tx
                            .send(ModuleMessage::Status(format!("{:?}: {:?}", self.id, cmd)))
                            .await;
                    }
                    _ => {}
                }
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        fn status(&self) -> HashMap<String, String> {
            HashMap::from([("id".to_string(), format!("{:?}", self.id))])
        }
    }

    #[test]
    fn test_route_commands() {
        assert_eq!(
            ModuleManager::route(&ConsoleCommand::VoiceSelectPreset { id: 2 }),
            ModuleId::Voice
        );
        assert_eq!(
            ModuleManager::route(&ConsoleCommand::DjToggleSync { deck: 0 }),
            ModuleId::Dj
        );
        assert_eq!(
            ModuleManager::route(&ConsoleCommand::DjSetCrossfade { position: 0.5 }),
            ModuleId::Dj
        );
    }

    #[tokio::test]
    async fn test_command_roundtrip_and_shutdown() {
        let mut manager = ModuleManager::new();
        manager.register_module(Box::new(EchoModule { id: ModuleId::Dj }));
        manager.register_module(Box::new(EchoModule {
            id: ModuleId::Voice,
        }));
        assert_eq!(manager.get_status().len(), 2);

        let mut rx = manager.take_message_receiver().unwrap();
        assert!(manager.take_message_receiver().is_none());

        manager.initialize().await.unwrap();
        manager.start().await.unwrap();
        assert!(manager.is_running());
        assert!(manager.start().await.is_err());

        manager.send_command(ConsoleCommand::VoicePlay).await.unwrap();
        match rx.recv().await {
            Some(ModuleMessage::Status(text)) => assert!(text.starts_with("Voice")),
            other => panic!("unexpected message: {:?}", other),
        }

        manager.shutdown().await.unwrap();
        assert!(!manager.is_running());
        assert!(manager
            .send_to_module(ModuleId::Dj, ModuleEvent::Shutdown)
            .await
            .is_err());
    }
}
