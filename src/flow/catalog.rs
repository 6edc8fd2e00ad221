//! Option lists and customer-facing texts for both flows.

use crate::flow::FlowKind;
use crate::flow::menu::MenuOption;

// ── Workshop ────────────────────────────────────────────────────────

pub const FABRICATION: &str = "fabricacao";
pub const REFORM: &str = "reforma";

pub const WORKSHOP_CATEGORIES: &[MenuOption] = &[
    MenuOption {
        id: FABRICATION,
        label: "Fabricação",
        description: "Móveis estofados sob medida",
        aliases: &["fabricar", "fabrica", "novo"],
    },
    MenuOption {
        id: REFORM,
        label: "Reforma",
        description: "Reforma e restauração de estofados",
        aliases: &["reformar", "restaurar", "conserto"],
    },
];

pub const FURNITURE: &[MenuOption] = &[
    MenuOption {
        id: "sofa",
        label: "Sofá",
        description: "",
        aliases: &["sofas"],
    },
    MenuOption {
        id: "cadeira",
        label: "Cadeira",
        description: "",
        aliases: &["cadeiras"],
    },
    MenuOption {
        id: "poltrona",
        label: "Poltrona",
        description: "",
        aliases: &["poltronas"],
    },
    MenuOption {
        id: "cama",
        label: "Cama",
        description: "",
        aliases: &["camas", "cabeceira"],
    },
];

pub const MEETING_KINDS: &[MenuOption] = &[
    MenuOption {
        id: "online",
        label: "Online",
        description: "Chamada de vídeo",
        aliases: &["video", "virtual", "remota"],
    },
    MenuOption {
        id: "presencial",
        label: "Presencial",
        description: "Visita à loja ou ao cliente",
        aliases: &["pessoalmente", "loja"],
    },
];

// ── Service desk ────────────────────────────────────────────────────

pub const QUOTE: &str = "orcamento";
pub const SCHEDULE_VISIT: &str = "agendar";
pub const ORDER_STATUS: &str = "consultar";
pub const HUMAN_AGENT: &str = "atendente";

pub const SERVICE_DESK_CATEGORIES: &[MenuOption] = &[
    MenuOption {
        id: QUOTE,
        label: "Solicitar orçamento",
        description: "Receba um orçamento personalizado",
        aliases: &["orcamento", "orçamento"],
    },
    MenuOption {
        id: SCHEDULE_VISIT,
        label: "Agendar visita",
        description: "Agende uma visita técnica",
        aliases: &["agendamento", "visita"],
    },
    MenuOption {
        id: ORDER_STATUS,
        label: "Consultar pedido",
        description: "Verifique o status do seu pedido",
        aliases: &["pedido", "status"],
    },
    MenuOption {
        id: HUMAN_AGENT,
        label: "Falar com atendente",
        description: "Fale diretamente com nossa equipe",
        aliases: &["humano", "atendimento"],
    },
];

// ── Shared ──────────────────────────────────────────────────────────

pub const YES: &str = "sim";
pub const NO: &str = "nao";

pub const YES_NO: &[MenuOption] = &[
    MenuOption {
        id: YES,
        label: "Sim",
        description: "",
        aliases: &["s", "yes", "quero"],
    },
    MenuOption {
        id: NO,
        label: "Não",
        description: "",
        aliases: &["n", "no", "nao quero"],
    },
];

/// Top-level categories for a flow.
pub fn categories(flow: FlowKind) -> &'static [MenuOption] {
    match flow {
        FlowKind::Workshop => WORKSHOP_CATEGORIES,
        FlowKind::ServiceDesk => SERVICE_DESK_CATEGORIES,
    }
}

/// Service name recorded on the intake for a category id.
pub fn service_name(category: &str) -> Option<&'static str> {
    match category {
        FABRICATION => Some("Fabricação"),
        REFORM => Some("Reforma"),
        QUOTE => Some("Orçamento"),
        SCHEDULE_VISIT => Some("Agendamento de visita"),
        ORDER_STATUS => Some("Consulta de pedido"),
        HUMAN_AGENT => Some("Atendimento humano"),
        _ => None,
    }
}

// ── Texts ───────────────────────────────────────────────────────────

pub const INVALID_OPTION: &str = "Opção inválida. Por favor, selecione uma das opções do menu.";

pub const DATETIME_HINT: &str =
    "Por favor, informe a data e horário desejado no formato:\nDD/MM/AAAA HH:MM\n\nExemplo: 15/10/2025 14:30";

pub const INVALID_DATETIME: &str =
    "Data inválida. Por favor, use o formato: DD/MM/AAAA HH:MM\n\nExemplo: 15/10/2025 14:30";

pub const PHOTO_REQUIRED: &str =
    "Não consegui identificar a foto. Por favor, envie uma imagem ou uma breve descrição do móvel. 📷";

pub const FINALIZE_FAILED: &str = "Erro ao registrar atendimento. Por favor, tente novamente.";

pub fn greeting(customer: &str, business: &str) -> String {
    format!("Olá {customer}! 👋\n\nBem-vindo(a) à *{business}*! 🛋️\n\nComo posso ajudá-lo(a) hoje?")
}

pub fn subtype_prompt(category: &str) -> &'static str {
    if category == FABRICATION {
        "Ótimo! Qual móvel você deseja fabricar?"
    } else {
        "Certo! Qual móvel precisa de reforma?"
    }
}

pub const HAS_DESIGN_PROMPT: &str = "Você já tem um projeto ou modelo do móvel que deseja?";

pub const DESIGN_PHOTO_PROMPT: &str =
    "Perfeito! Envie uma foto ou imagem do projeto para nossa equipe analisar. 📷";

pub const REFORM_PHOTO_PROMPT: &str =
    "Envie uma foto do móvel que precisa de reforma (ou descreva o estado atual dele). 📷";

pub const MEETING_PROMPT: &str = "Como você prefere conversar com nossa equipe?";

pub const QUOTE_VISIT_PROMPT: &str = "Ótimo! Vou registrar sua solicitação de orçamento. 📋\n\nEm breve nossa equipe entrará em contato.\n\nGostaria de agendar uma visita?";

pub fn schedule_visit_prompt() -> String {
    format!("Perfeito! Vou registrar seu agendamento. 📅\n\n{DATETIME_HINT}")
}

pub fn order_status_reply(phone: &str) -> String {
    format!(
        "Para consultar seu pedido, entre em contato pelo telefone: {phone}\n\nOu aguarde que um atendente irá lhe ajudar em breve."
    )
}

pub const HUMAN_AGENT_REPLY: &str =
    "Um de nossos atendentes irá lhe responder em breve. 👤\n\nAguarde um momento, por favor.";

pub fn no_visit_reply(business: &str) -> String {
    format!(
        "Entendido! Sua solicitação foi registrada. ✅\n\nEm breve nossa equipe entrará em contato.\n\nObrigado por escolher a {business}! 🛋️"
    )
}

pub fn scheduled_reply(when: &str, business: &str) -> String {
    format!(
        "Agendamento confirmado para: {when} ✅\n\nSua solicitação foi registrada com sucesso!\n\nEm breve confirmaremos seu agendamento.\n\nObrigado por escolher a {business}! 🛋️"
    )
}

pub fn registered_reply(business: &str) -> String {
    format!(
        "Sua solicitação foi registrada com sucesso! ✅\n\nEm breve nossa equipe entrará em contato.\n\nObrigado por escolher a {business}! 🛋️"
    )
}
